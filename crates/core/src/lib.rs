// Lifecheck Core - Domain Logic & Ports
// NO infrastructure dependencies (Hexagonal Architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{LifecycleError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
