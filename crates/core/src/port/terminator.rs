// Process termination port
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Pid;

/// Result of a forced termination attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Signal delivered
    Killed,
    /// "No such process": it exited between scan and kill
    AlreadyExited,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminationError {
    #[error("Failed to kill pid {pid}: {reason}")]
    Signal { pid: Pid, reason: String },

    #[error("Forced termination is not supported on this platform")]
    Unsupported,
}

#[async_trait]
pub trait Terminator: Send + Sync {
    /// Immediately and non-gracefully terminate `pid` (SIGKILL on unix)
    ///
    /// # Errors
    /// - TerminationError::Signal for any failure other than "no such process"
    async fn force_kill(&self, pid: Pid) -> Result<KillOutcome, TerminationError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::process_table::mocks::MockProcessTable;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Terminator that removes killed pids from a linked `MockProcessTable`
    pub struct MockTerminator {
        table: MockProcessTable,
        denied: Arc<Mutex<HashSet<Pid>>>,
        calls: Arc<Mutex<Vec<Pid>>>,
    }

    impl MockTerminator {
        pub fn new(table: MockProcessTable) -> Self {
            Self {
                table,
                denied: Arc::new(Mutex::new(HashSet::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Kills of `pid` fail with a permission error
        pub fn deny(&self, pid: i64) {
            self.denied.lock().unwrap().insert(Pid::new(pid).unwrap());
        }

        pub fn calls(&self) -> Vec<Pid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Terminator for MockTerminator {
        async fn force_kill(&self, pid: Pid) -> Result<KillOutcome, TerminationError> {
            self.calls.lock().unwrap().push(pid);

            if self.denied.lock().unwrap().contains(&pid) {
                return Err(TerminationError::Signal {
                    pid,
                    reason: "EPERM: Operation not permitted".to_string(),
                });
            }

            if self.table.kill(pid) {
                Ok(KillOutcome::Killed)
            } else {
                Ok(KillOutcome::AlreadyExited)
            }
        }
    }
}
