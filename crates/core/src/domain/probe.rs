// Probe & Poll Policy Domain Model

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::error::{DomainError, Result};
use super::process::Pid;
use crate::port::ReadinessObserver;

/// A single externally observable readiness condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A file appears at `path`
    FileExists { path: PathBuf },
    /// Something accepts connections at `address` (`tcp://`, `http://` or `https://`)
    NetworkListening { address: String },
    /// The process `pid` is no longer running
    ProcessExited { pid: Pid },
}

impl Probe {
    pub fn file_exists(path: impl Into<PathBuf>) -> Self {
        Probe::FileExists { path: path.into() }
    }

    pub fn network_listening(address: impl Into<String>) -> Self {
        Probe::NetworkListening {
            address: address.into(),
        }
    }

    pub fn process_exited(pid: Pid) -> Self {
        Probe::ProcessExited { pid }
    }

    /// Path watched by a `FileExists` probe
    pub fn path(&self) -> Option<&Path> {
        match self {
            Probe::FileExists { path } => Some(path),
            _ => None,
        }
    }

    /// Evaluate the probe once
    ///
    /// Observation errors (unreadable file, refused connection, vanished
    /// process entry) mean "not ready yet", never a failure of the wait.
    pub async fn check(&self, observer: &dyn ReadinessObserver) -> bool {
        let result = match self {
            Probe::FileExists { path } => observer.file_exists(path).await,
            Probe::NetworkListening { address } => observer.is_listening(address).await,
            Probe::ProcessExited { pid } => observer.has_exited(*pid).await,
        };

        match result {
            Ok(ready) => ready,
            Err(e) => {
                debug!(probe = %self, error = %e, "Probe check failed, treating as not ready");
                false
            }
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::FileExists { path } => write!(f, "file {}", path.display()),
            Probe::NetworkListening { address } => write!(f, "listener {}", address),
            Probe::ProcessExited { pid } => write!(f, "exit of pid {}", pid),
        }
    }
}

/// Fixed-interval, bounded polling policy
///
/// Invariant: `interval > 0 && timeout >= interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    timeout: Duration,
    interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(DomainError::InvalidPolicy(
                "interval must be greater than zero".to_string(),
            ));
        }
        if timeout < interval {
            return Err(DomainError::InvalidPolicy(format!(
                "timeout {:?} is shorter than interval {:?}",
                timeout, interval
            )));
        }
        Ok(Self { timeout, interval })
    }

    /// Poll once per second for `timeout_secs` seconds
    pub fn every_second(timeout_secs: u64) -> Result<Self> {
        Self::new(Duration::from_secs(timeout_secs), Duration::from_secs(1))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::readiness_observer::mocks::MockReadinessObserver;

    #[test]
    fn test_policy_invariants() {
        assert!(PollPolicy::new(Duration::from_secs(10), Duration::from_secs(1)).is_ok());
        assert!(PollPolicy::new(Duration::from_secs(1), Duration::from_secs(1)).is_ok());
        assert!(matches!(
            PollPolicy::new(Duration::from_secs(10), Duration::ZERO),
            Err(DomainError::InvalidPolicy(_))
        ));
        assert!(matches!(
            PollPolicy::new(Duration::from_millis(500), Duration::from_secs(1)),
            Err(DomainError::InvalidPolicy(_))
        ));
        assert!(PollPolicy::every_second(0).is_err());
    }

    #[tokio::test]
    async fn test_check_dispatches_per_variant() {
        let observer = MockReadinessObserver::new();
        let pid = Pid::new(4242).unwrap();
        observer.file_ready_after("/state/vpnkit.pid", 0);
        observer.exited_after(pid, 0);

        assert!(Probe::file_exists("/state/vpnkit.pid").check(&observer).await);
        assert!(!Probe::network_listening("tcp://127.0.0.1:1").check(&observer).await);
        assert!(Probe::process_exited(pid).check(&observer).await);
    }

    #[tokio::test]
    async fn test_check_treats_errors_as_not_ready() {
        let observer = MockReadinessObserver::new();
        observer.listener_fails_times("http://localhost:8888", 2);
        observer.listener_ready_after("http://localhost:8888", 0);

        let probe = Probe::network_listening("http://localhost:8888");
        assert!(!probe.check(&observer).await);
        assert!(!probe.check(&observer).await);
        assert!(probe.check(&observer).await);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Probe::network_listening("https://10.245.0.2:25555").to_string(),
            "listener https://10.245.0.2:25555"
        );
        assert_eq!(
            Probe::process_exited(Pid::new(5).unwrap()).to_string(),
            "exit of pid 5"
        );
    }
}
