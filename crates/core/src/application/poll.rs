// Bounded fixed-interval polling
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::domain::{PollPolicy, Probe};
use crate::port::ReadinessObserver;

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { elapsed: Duration, checks: u32 },
    TimedOut { elapsed: Duration, checks: u32 },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Ready { elapsed, .. } | WaitOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    pub fn checks(&self) -> u32 {
        match self {
            WaitOutcome::Ready { checks, .. } | WaitOutcome::TimedOut { checks, .. } => *checks,
        }
    }
}

/// Evaluates probes at a constant interval until ready or out of time
///
/// There is no backoff and no cancel hook: a wait ends on success or on
/// deadline exhaustion only.
pub struct PollWaiter {
    observer: Arc<dyn ReadinessObserver>,
}

impl PollWaiter {
    pub fn new(observer: Arc<dyn ReadinessObserver>) -> Self {
        Self { observer }
    }

    /// Wait for `probe` to report ready
    ///
    /// # Example
    /// ```text
    /// let outcome = waiter
    ///     .wait(&Probe::file_exists("/state/vpnkit.pid"), PollPolicy::every_second(10)?)
    ///     .await;
    /// ```
    pub async fn wait(&self, probe: &Probe, policy: PollPolicy) -> WaitOutcome {
        let observer = self.observer.as_ref();
        self.wait_until(&probe.to_string(), policy, || probe.check(observer))
            .await
    }

    /// Wait for an arbitrary condition with the same loop as `wait`
    ///
    /// The condition is checked immediately, then every `interval`. Once the
    /// elapsed time reaches `timeout` after a failed check, the wait gives up,
    /// so a timed out wait always reports `elapsed >= timeout`.
    pub async fn wait_until<F, Fut>(
        &self,
        description: &str,
        policy: PollPolicy,
        mut condition: F,
    ) -> WaitOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        let mut checks = 0u32;

        loop {
            checks += 1;
            if condition().await {
                let elapsed = start.elapsed();
                debug!(
                    waiting_for = %description,
                    elapsed_ms = %elapsed.as_millis(),
                    checks = %checks,
                    "Condition satisfied"
                );
                return WaitOutcome::Ready { elapsed, checks };
            }

            let elapsed = start.elapsed();
            if elapsed >= policy.timeout() {
                warn!(
                    waiting_for = %description,
                    timeout_ms = %policy.timeout().as_millis(),
                    elapsed_ms = %elapsed.as_millis(),
                    checks = %checks,
                    "Timed out waiting for condition"
                );
                return WaitOutcome::TimedOut { elapsed, checks };
            }

            sleep(policy.interval()).await;
        }
    }
}
