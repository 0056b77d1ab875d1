// Forced termination implementation
// reason: nix for direct kill(2) on unix
use async_trait::async_trait;
use tracing::{debug, info};

use lifecheck_core::domain::Pid;
use lifecheck_core::port::{KillOutcome, TerminationError, Terminator};

/// SIGKILL by pid (taskkill /F on Windows)
///
/// Never signals process groups: only the exact pid the scanner reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl SignalTerminator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Terminator for SignalTerminator {
    async fn force_kill(&self, pid: Pid) -> Result<KillOutcome, TerminationError> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};

            debug!(pid = %pid, "Sending SIGKILL");
            match kill(nix::unistd::Pid::from_raw(pid.as_i32()), Signal::SIGKILL) {
                Ok(()) => {
                    info!(pid = %pid, "SIGKILL delivered");
                    Ok(KillOutcome::Killed)
                }
                Err(Errno::ESRCH) => Ok(KillOutcome::AlreadyExited),
                Err(e) => Err(TerminationError::Signal {
                    pid,
                    reason: format!("SIGKILL failed: {}", e),
                }),
            }
        }

        #[cfg(windows)]
        {
            let output = tokio::process::Command::new("taskkill")
                .args(["/F", "/PID", &pid.to_string()])
                .output()
                .await
                .map_err(|e| TerminationError::Signal {
                    pid,
                    reason: e.to_string(),
                })?;

            if output.status.success() {
                info!(pid = %pid, "Process killed");
                return Ok(KillOutcome::Killed);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            // taskkill reports a missing pid as "not found"
            if stderr.contains("not found") {
                return Ok(KillOutcome::AlreadyExited);
            }
            Err(TerminationError::Signal {
                pid,
                reason: format!("taskkill failed: {}", stderr.trim()),
            })
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = pid;
            Err(TerminationError::Unsupported)
        }
    }
}
