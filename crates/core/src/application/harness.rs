// Scenario harness
// Brackets a scenario with the reaper: clean before, clean after.
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::reaper::{ProcessReaper, ReapOutcome};
use crate::application::sequencer::{LifecycleSequencer, RunOutcome, ScenarioReport};
use crate::domain::{ProcessPatterns, Scenario};
use crate::error::{LifecycleError, Result};
use crate::port::ControlSurface;

/// Runs scenarios against the singleton environment
///
/// A scenario only starts from a clean process table, and leaves one behind
/// whatever its outcome.
pub struct Harness {
    sequencer: LifecycleSequencer,
    reaper: ProcessReaper,
    control: Arc<dyn ControlSurface>,
    patterns: ProcessPatterns,
}

impl Harness {
    pub fn new(
        sequencer: LifecycleSequencer,
        reaper: ProcessReaper,
        control: Arc<dyn ControlSurface>,
        patterns: ProcessPatterns,
    ) -> Self {
        Self {
            sequencer,
            reaper,
            control,
            patterns,
        }
    }

    pub fn patterns(&self) -> &ProcessPatterns {
        &self.patterns
    }

    /// Reap, run `scenario`, clean up, reap again
    ///
    /// # Errors
    /// - ProcessLeak if stale processes survive the pre-run reap (scenario not started)
    /// - the scenario's own failure, which takes precedence over cleanup problems
    /// - ProcessLeak if the scenario left processes behind
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        let stale = self.reaper.ensure_clean(&self.patterns).await?;
        if stale > 0 {
            warn!(killed = %stale, "Killed stale processes from a previous run");
        }

        let outcome = self.sequencer.run(scenario).await;

        if !outcome.is_completed() {
            self.best_effort_stop().await;
        }
        let cleanup = self.reaper.reap(&self.patterns).await;

        let report = outcome.into_result()?;
        match cleanup? {
            ReapOutcome::Clean { killed: 0 } => {
                info!(scenario = %scenario.name(), "Scenario left a clean environment");
                Ok(report)
            }
            ReapOutcome::Clean { killed } => {
                warn!(killed = %killed, "Processes were still running after a completed scenario");
                Ok(report)
            }
            ReapOutcome::LeakDetected(survivors) => Err(LifecycleError::ProcessLeak { survivors }),
        }
    }

    /// Run and hand back the raw outcome (pre/post reaping still applies)
    pub async fn run_outcome(&self, scenario: &Scenario) -> Result<RunOutcome> {
        self.reaper.ensure_clean(&self.patterns).await?;
        let outcome = self.sequencer.run(scenario).await;
        if !outcome.is_completed() {
            self.best_effort_stop().await;
        }
        self.reaper.ensure_clean(&self.patterns).await?;
        Ok(outcome)
    }

    async fn best_effort_stop(&self) {
        match self.control.stop().await {
            Ok(report) if report.success() => info!("Environment stopped after failure"),
            Ok(report) => warn!(exit_code = ?report.exit_code, "Stop after failure exited non-zero"),
            Err(e) => warn!(error = %e, "Stop after failure could not run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::reaper::ReapPolicy;
    use crate::application::scanner::ProcessScanner;
    use crate::domain::{Completion, Phase, PollPolicy, Probe};
    use crate::port::control_surface::mocks::MockControlSurface;
    use crate::port::process_table::mocks::MockProcessTable;
    use crate::port::readiness_observer::mocks::MockReadinessObserver;
    use crate::port::terminator::mocks::MockTerminator;
    use std::time::Duration;

    struct Fixture {
        table: MockProcessTable,
        terminator: Arc<MockTerminator>,
        control: Arc<MockControlSurface>,
        observer: MockReadinessObserver,
        harness: Harness,
    }

    fn fixture() -> Fixture {
        let table = MockProcessTable::with_processes([(1, "/sbin/init"), (2, "/bin/bash")]);
        let terminator = Arc::new(MockTerminator::new(table.clone()));
        let control = Arc::new(MockControlSurface::new("Starting VPNKit"));
        let observer = MockReadinessObserver::new();

        let harness = Harness::new(
            LifecycleSequencer::new(control.clone(), Arc::new(observer.clone())),
            ProcessReaper::new(
                ProcessScanner::new(Arc::new(table.clone())),
                terminator.clone(),
                ReapPolicy::default(),
            ),
            control.clone(),
            ProcessPatterns::new(["linuxkit", "hyperkit", "vpnkit"]),
        );

        Fixture {
            table,
            terminator,
            control,
            observer,
            harness,
        }
    }

    fn scenario() -> Scenario {
        Scenario::builder("bracketed")
            .phase(Phase::new(
                "hypervisor-ready",
                Probe::file_exists("/state/hyperkit.pid"),
                PollPolicy::every_second(120).unwrap(),
            ))
            .completion(Completion::AwaitExit {
                expected_code: 0,
                timeout: Duration::from_secs(300),
            })
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_process_is_reaped_before_scenario() {
        let f = fixture();
        f.table.spawn(666, "/usr/local/bin/hyperkit -A -u");
        f.observer.file_ready_after("/state/hyperkit.pid", 0);

        let report = f.harness.run(&scenario()).await.unwrap();

        assert_eq!(report.phases.len(), 1);
        assert!(!f.table.is_running(666));
        assert_eq!(f.terminator.calls(), vec![crate::domain::Pid::new(666).unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_stray_blocks_scenario() {
        let f = fixture();
        f.table.spawn(666, "/usr/local/bin/hyperkit -A -u");
        f.table.make_immortal(666);

        let result = f.harness.run(&scenario()).await;

        match result {
            Err(LifecycleError::ProcessLeak { survivors }) => {
                assert_eq!(survivors[0].command_line, "/usr/local/bin/hyperkit -A -u");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(f.control.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_scenario_still_stops_and_reaps() {
        let f = fixture();
        // hyperkit.pid never appears, but start leaves a vpnkit behind
        let table = f.table.clone();
        f.control.on_start(move || table.spawn(700, "vpnkit --ethernet"));

        let result = f.harness.run(&scenario()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::ProbeTimeout { ref phase, .. }) if phase == "hypervisor-ready"
        ));
        assert_eq!(f.control.events(), vec!["start", "interrupt", "stop"]);
        assert!(!f.table.is_running(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_failure_wins_over_leak() {
        let f = fixture();
        let table = f.table.clone();
        f.control.on_start(move || {
            table.spawn(710, "hyperkit -A");
            table.make_immortal(710);
        });

        let result = f.harness.run(&scenario()).await;

        assert!(matches!(result, Err(LifecycleError::ProbeTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_after_completion_is_killed() {
        let f = fixture();
        f.observer.file_ready_after("/state/hyperkit.pid", 0);
        let table = f.table.clone();
        f.control.on_start(move || table.spawn(800, "linuxkit run"));

        let report = f.harness.run(&scenario()).await.unwrap();

        assert_eq!(report.workload_exit_code, Some(0));
        assert!(!f.table.is_running(800));
        assert_eq!(f.control.events(), vec!["start", "wait", "stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_leftover_after_completion_is_a_leak() {
        let f = fixture();
        f.observer.file_ready_after("/state/hyperkit.pid", 0);
        let table = f.table.clone();
        f.control.on_start(move || {
            table.spawn(900, "hyperkit -A");
            table.make_immortal(900);
        });

        let result = f.harness.run(&scenario()).await;

        match result {
            Err(LifecycleError::ProcessLeak { survivors }) => {
                assert_eq!(survivors.len(), 1);
                assert_eq!(i64::from(survivors[0].pid), 900);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_outcome_exposes_failed_phase() {
        let f = fixture();

        let outcome = f.harness.run_outcome(&scenario()).await.unwrap();

        match outcome {
            RunOutcome::FailedAtPhase { phase, .. } => assert_eq!(phase, "hypervisor-ready"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
