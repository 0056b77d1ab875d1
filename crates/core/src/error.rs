// Central Error Type for the Application

use std::time::Duration;
use thiserror::Error;

use crate::domain::ProcessRecord;

/// Application-level error type
///
/// Every variant aborts the current scenario; nothing here is retried.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Phase '{phase}' timed out after {elapsed:?} (timeout {timeout:?})")]
    ProbeTimeout {
        phase: String,
        timeout: Duration,
        elapsed: Duration,
    },

    #[error("Phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    #[error("{} process(es) survived the reaper: {}", .survivors.len(), command_lines(.survivors))]
    ProcessLeak { survivors: Vec<ProcessRecord> },

    #[error(transparent)]
    ProcessTableUnavailable(#[from] crate::port::ProcessTableError),

    #[error(transparent)]
    TerminationSignal(#[from] crate::port::TerminationError),

    #[error("Control surface error: {0}")]
    ControlSurface(#[from] crate::port::ControlSurfaceError),
}

fn command_lines(records: &[ProcessRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using LifecycleError
pub type Result<T> = std::result::Result<T, LifecycleError>;
