// Process reaper
// Kill pass, then verify pass. Brackets every scenario.
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::constants::{DEFAULT_REAP_VERIFY_ATTEMPTS, DEFAULT_REAP_VERIFY_INTERVAL};
use crate::application::scanner::ProcessScanner;
use crate::domain::{ProcessPatterns, ProcessRecord};
use crate::error::{LifecycleError, Result};
use crate::port::{KillOutcome, Terminator};

/// Verify pass configuration
///
/// The default is a single verification scan with no retry. Raising
/// `verify_attempts` tolerates processes that take longer than one scan
/// round-trip to leave the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapPolicy {
    pub verify_attempts: u32,
    pub verify_interval: Duration,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            verify_attempts: DEFAULT_REAP_VERIFY_ATTEMPTS,
            verify_interval: DEFAULT_REAP_VERIFY_INTERVAL,
        }
    }
}

/// Reap result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Nothing matching is left; `killed` signals were delivered
    Clean { killed: usize },
    /// These processes were still present after the kill pass
    LeakDetected(Vec<ProcessRecord>),
}

/// Forcibly terminates matching processes and proves they are gone
///
/// Owns no state between calls; reaping an already clean machine is a no-op.
pub struct ProcessReaper {
    scanner: ProcessScanner,
    terminator: Arc<dyn Terminator>,
    policy: ReapPolicy,
}

impl ProcessReaper {
    pub fn new(scanner: ProcessScanner, terminator: Arc<dyn Terminator>, policy: ReapPolicy) -> Self {
        Self {
            scanner,
            terminator,
            policy,
        }
    }

    /// Kill every process matching `patterns`, then re-scan
    ///
    /// # Errors
    /// - ProcessTableUnavailable if either scan cannot read the table
    /// - TerminationSignal if a kill fails for a reason other than "no such process"
    pub async fn reap(&self, patterns: &ProcessPatterns) -> Result<ReapOutcome> {
        // Kill pass
        let targets = self.scanner.scan(patterns).await?;
        let mut killed = 0;

        for record in &targets {
            match self.terminator.force_kill(record.pid).await {
                Ok(KillOutcome::Killed) => {
                    info!(pid = %record.pid, command_line = %record.command_line, "Killed leftover process");
                    killed += 1;
                }
                Ok(KillOutcome::AlreadyExited) => {
                    info!(pid = %record.pid, "Process exited before it could be killed");
                }
                Err(e) => {
                    error!(pid = %record.pid, error = %e, "Failed to kill leftover process");
                    return Err(e.into());
                }
            }
        }

        // Verify pass
        let attempts = self.policy.verify_attempts.max(1);
        let mut survivors = Vec::new();
        for attempt in 1..=attempts {
            survivors = self.scanner.scan(patterns).await?;
            if survivors.is_empty() {
                info!(patterns = %patterns, killed = %killed, "Process table clean");
                return Ok(ReapOutcome::Clean { killed });
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.verify_interval).await;
            }
        }

        for survivor in &survivors {
            warn!(pid = %survivor.pid, command_line = %survivor.command_line, "Process survived reaping");
        }
        Ok(ReapOutcome::LeakDetected(survivors))
    }

    /// Reap and turn a leak into `LifecycleError::ProcessLeak`
    ///
    /// Returns the number of processes that had to be killed.
    pub async fn ensure_clean(&self, patterns: &ProcessPatterns) -> Result<usize> {
        match self.reap(patterns).await? {
            ReapOutcome::Clean { killed } => Ok(killed),
            ReapOutcome::LeakDetected(survivors) => Err(LifecycleError::ProcessLeak { survivors }),
        }
    }
}
