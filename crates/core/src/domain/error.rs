// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid pid: {0} (must be a positive process id)")]
    InvalidPid(i64),

    #[error("Invalid pid file content: {0:?}")]
    InvalidPidFile(String),

    #[error("Invalid poll policy: {0}")]
    InvalidPolicy(String),

    #[error("Duplicate phase name: {0}")]
    DuplicatePhase(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
