// Readiness observation port
// Read-only access to the externally visible side effects of the environment.
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::domain::Pid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Process inspection failed: {0}")]
    Process(String),
}

#[async_trait]
pub trait ReadinessObserver: Send + Sync {
    /// true if something exists at `path`
    async fn file_exists(&self, path: &Path) -> Result<bool, ObserveError>;

    /// true if `address` accepts connections
    ///
    /// # Arguments
    /// * `address` - `tcp://host:port`, or an `http(s)://` URL that must answer
    ///   with any HTTP response
    async fn is_listening(&self, address: &str) -> Result<bool, ObserveError>;

    /// true if `pid` is no longer running (gone, or a zombie awaiting reap)
    async fn has_exited(&self, pid: Pid) -> Result<bool, ObserveError>;

    /// Read a small text file (pid files)
    async fn read_file(&self, path: &Path) -> Result<String, ObserveError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        checks: usize,
        fail_first: usize,
        ready_after: Option<usize>,
    }

    impl Script {
        /// Next check: the first `fail_first` checks error, then the probe is
        /// ready once more than `ready_after` successful checks happened
        fn next(&mut self, key: &str) -> Result<bool, ObserveError> {
            self.checks += 1;
            if self.checks <= self.fail_first {
                return Err(ObserveError::Io(format!("scripted failure for {}", key)));
            }
            let answered = self.checks - self.fail_first;
            Ok(self.ready_after.is_some_and(|n| answered > n))
        }
    }

    /// Scripted observer
    ///
    /// Every probe target is "never ready" until scripted otherwise. All checks
    /// are recorded in order so tests can assert on evaluation sequence.
    #[derive(Clone, Default)]
    pub struct MockReadinessObserver {
        scripts: Arc<Mutex<HashMap<String, Script>>>,
        files: Arc<Mutex<HashMap<PathBuf, String>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MockReadinessObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn file_key(path: impl AsRef<Path>) -> String {
            format!("file:{}", path.as_ref().display())
        }

        pub fn listener_key(address: &str) -> String {
            format!("listen:{}", address)
        }

        pub fn exited_key(pid: Pid) -> String {
            format!("exited:{}", pid)
        }

        fn script(&self, key: String, update: impl FnOnce(&mut Script)) {
            let mut scripts = self.scripts.lock().unwrap();
            update(scripts.entry(key).or_default());
        }

        pub fn file_ready_after(&self, path: impl AsRef<Path>, checks: usize) {
            self.script(Self::file_key(path), |s| s.ready_after = Some(checks));
        }

        pub fn listener_ready_after(&self, address: &str, checks: usize) {
            self.script(Self::listener_key(address), |s| s.ready_after = Some(checks));
        }

        pub fn listener_fails_times(&self, address: &str, failures: usize) {
            self.script(Self::listener_key(address), |s| s.fail_first = failures);
        }

        pub fn exited_after(&self, pid: Pid, checks: usize) {
            self.script(Self::exited_key(pid), |s| s.ready_after = Some(checks));
        }

        pub fn set_file_content(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), content.into());
        }

        /// Keys of every check performed, in order
        pub fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn check_count(&self, key: &str) -> usize {
            self.log.lock().unwrap().iter().filter(|k| *k == key).count()
        }

        fn observe(&self, key: String) -> Result<bool, ObserveError> {
            self.log.lock().unwrap().push(key.clone());
            let mut scripts = self.scripts.lock().unwrap();
            scripts.entry(key.clone()).or_default().next(&key)
        }
    }

    #[async_trait]
    impl ReadinessObserver for MockReadinessObserver {
        async fn file_exists(&self, path: &Path) -> Result<bool, ObserveError> {
            self.observe(Self::file_key(path))
        }

        async fn is_listening(&self, address: &str) -> Result<bool, ObserveError> {
            self.observe(Self::listener_key(address))
        }

        async fn has_exited(&self, pid: Pid) -> Result<bool, ObserveError> {
            self.observe(Self::exited_key(pid))
        }

        async fn read_file(&self, path: &Path) -> Result<String, ObserveError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| ObserveError::Io(format!("{}: not found", path.display())))
        }
    }
}
