// Domain Layer - Pure lifecycle model (no I/O)

pub mod environment;
pub mod error;
pub mod probe;
pub mod process;
pub mod scenario;

// Re-exports
pub use environment::{Component, EnvironmentConfig};
pub use error::DomainError;
pub use probe::{PollPolicy, Probe};
pub use process::{Pid, ProcessPatterns, ProcessRecord};
pub use scenario::{Completion, Phase, Scenario, ScenarioBuilder, StartRequest, StartupMarker};
