// Port Layer - Interfaces for external dependencies

pub mod control_surface;
pub mod process_table;
pub mod readiness_observer;
pub mod terminator;

// Re-exports
pub use control_surface::{ControlSurface, ControlSurfaceError, RunningCommand, StopReport};
pub use process_table::{ProcessTable, ProcessTableError};
pub use readiness_observer::{ObserveError, ReadinessObserver};
pub use terminator::{KillOutcome, TerminationError, Terminator};
