// Process table port
// A single enumerate operation; adapters may use native OS listing APIs.
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ProcessRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessTableError {
    /// The table could not be read at all. Never reported as "zero processes".
    #[error("Process table unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Snapshot every process visible to the caller's user context
    ///
    /// The snapshot is stale as soon as it is returned: processes may start
    /// or exit before the caller acts on it.
    async fn enumerate(&self) -> Result<Vec<ProcessRecord>, ProcessTableError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::Pid;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// In-memory process table
    ///
    /// Clones share state, so a `MockTerminator` linked to a clone removes
    /// killed processes from the same table. Pids marked immortal survive kills
    /// (a respawning process).
    #[derive(Clone, Default)]
    pub struct MockProcessTable {
        processes: Arc<Mutex<Vec<ProcessRecord>>>,
        immortal: Arc<Mutex<HashSet<Pid>>>,
        vanishing: Arc<Mutex<HashSet<Pid>>>,
        unavailable: Arc<Mutex<bool>>,
        enumerate_count: Arc<Mutex<usize>>,
    }

    impl MockProcessTable {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_processes<I, S>(processes: I) -> Self
        where
            I: IntoIterator<Item = (i64, S)>,
            S: Into<String>,
        {
            let table = Self::new();
            for (pid, command_line) in processes {
                table.spawn(pid, command_line);
            }
            table
        }

        pub fn spawn(&self, pid: i64, command_line: impl Into<String>) {
            let pid = Pid::new(pid).unwrap();
            self.processes
                .lock()
                .unwrap()
                .push(ProcessRecord::new(pid, command_line));
        }

        pub fn make_immortal(&self, pid: i64) {
            self.immortal.lock().unwrap().insert(Pid::new(pid).unwrap());
        }

        /// `pid` exits on its own right after the next snapshot lists it
        pub fn exits_after_next_scan(&self, pid: i64) {
            self.vanishing.lock().unwrap().insert(Pid::new(pid).unwrap());
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            *self.unavailable.lock().unwrap() = unavailable;
        }

        /// Remove `pid` unless it is immortal. Returns false if it was not running.
        pub fn kill(&self, pid: Pid) -> bool {
            let mut processes = self.processes.lock().unwrap();
            let running = processes.iter().any(|p| p.pid == pid);
            if running && !self.immortal.lock().unwrap().contains(&pid) {
                processes.retain(|p| p.pid != pid);
            }
            running
        }

        pub fn is_running(&self, pid: i64) -> bool {
            self.processes
                .lock()
                .unwrap()
                .iter()
                .any(|p| i64::from(p.pid) == pid)
        }

        pub fn enumerate_count(&self) -> usize {
            *self.enumerate_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProcessTable for MockProcessTable {
        async fn enumerate(&self) -> Result<Vec<ProcessRecord>, ProcessTableError> {
            *self.enumerate_count.lock().unwrap() += 1;
            if *self.unavailable.lock().unwrap() {
                return Err(ProcessTableError::Unavailable(
                    "mock table unreadable".to_string(),
                ));
            }
            let mut processes = self.processes.lock().unwrap();
            let snapshot = processes.clone();
            let vanishing: HashSet<Pid> = self.vanishing.lock().unwrap().drain().collect();
            processes.retain(|p| !vanishing.contains(&p.pid));
            Ok(snapshot)
        }
    }
}
