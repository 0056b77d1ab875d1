//! Lifecycle sequencer - drives one end-to-end scenario
//!
//! Initial -> PhaseLoop -> WorkloadCompletion -> Teardown -> TeardownVerification
//!
//! Every step is fail-fast: the first failure ends the run and no later step
//! is evaluated. Phases run strictly in declared order on the caller's task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::constants::{
    PHASE_CONTROL_SURFACE_STARTED, PHASE_START, PHASE_TEARDOWN, PHASE_TEARDOWN_VERIFICATION,
    PHASE_WORKLOAD_COMPLETION,
};
use crate::application::poll::{PollWaiter, WaitOutcome};
use crate::domain::{Completion, Pid, Probe, Scenario};
use crate::error::LifecycleError;
use crate::port::{ControlSurface, ReadinessObserver, RunningCommand};

/// Why a scenario stopped at a given phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout { timeout: Duration, elapsed: Duration },
    UnexpectedExit { expected: i32, actual: Option<i32> },
    ProcessStillRunning { pid: Pid, timeout: Duration },
    PidCapture(String),
    ControlSurface(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout { timeout, elapsed } => {
                write!(f, "timeout after {:?} (limit {:?})", elapsed, timeout)
            }
            FailureReason::UnexpectedExit { expected, actual } => match actual {
                Some(code) => write!(f, "exited with status {} (expected {})", code, expected),
                None => write!(f, "killed by a signal (expected status {})", expected),
            },
            FailureReason::ProcessStillRunning { pid, timeout } => {
                write!(f, "pid {} still running {:?} after stop", pid, timeout)
            }
            FailureReason::PidCapture(msg) => write!(f, "could not capture pid: {}", msg),
            FailureReason::ControlSurface(msg) => write!(f, "control surface: {}", msg),
        }
    }
}

/// Timing of one satisfied phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub elapsed_ms: u64,
    pub checks: u32,
}

/// Summary of a completed scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseReport>,
    pub workload_exit_code: Option<i32>,
    pub tracked_pids: Vec<Pid>,
}

/// Terminal state of a run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(ScenarioReport),
    FailedAtPhase { phase: String, reason: FailureReason },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// Timeouts become `ProbeTimeout`, everything else `PhaseFailed`
    pub fn into_result(self) -> crate::error::Result<ScenarioReport> {
        match self {
            RunOutcome::Completed(report) => Ok(report),
            RunOutcome::FailedAtPhase {
                phase,
                reason: FailureReason::Timeout { timeout, elapsed },
            } => Err(LifecycleError::ProbeTimeout {
                phase,
                timeout,
                elapsed,
            }),
            RunOutcome::FailedAtPhase { phase, reason } => Err(LifecycleError::PhaseFailed {
                phase,
                reason: reason.to_string(),
            }),
        }
    }
}

/// Internal: a failed step, before it is turned into a `RunOutcome`
struct StepFailure {
    phase: String,
    reason: FailureReason,
}

impl StepFailure {
    fn new(phase: &str, reason: FailureReason) -> Self {
        Self {
            phase: phase.to_string(),
            reason,
        }
    }
}

type StepResult<T> = std::result::Result<T, StepFailure>;

/// Progress accumulated while a run moves through its states
struct RunState {
    phases: Vec<PhaseReport>,
    workload_exit_code: Option<i32>,
    tracked_pids: Vec<Pid>,
}

pub struct LifecycleSequencer {
    control: Arc<dyn ControlSurface>,
    observer: Arc<dyn ReadinessObserver>,
    waiter: PollWaiter,
}

impl LifecycleSequencer {
    pub fn new(control: Arc<dyn ControlSurface>, observer: Arc<dyn ReadinessObserver>) -> Self {
        Self {
            control,
            waiter: PollWaiter::new(observer.clone()),
            observer,
        }
    }

    /// Execute `scenario` once
    pub async fn run(&self, scenario: &Scenario) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("scenario", scenario = %scenario.name(), run_id = %run_id);

        async {
            let started_at = Utc::now();
            info!(phases = %scenario.phases().len(), "Scenario starting");

            let mut state = RunState {
                phases: Vec::with_capacity(scenario.phases().len()),
                workload_exit_code: None,
                tracked_pids: Vec::new(),
            };

            match self.execute(scenario, &mut state).await {
                Ok(()) => {
                    info!("Scenario completed");
                    RunOutcome::Completed(ScenarioReport {
                        run_id,
                        scenario: scenario.name().to_string(),
                        started_at,
                        finished_at: Utc::now(),
                        phases: state.phases,
                        workload_exit_code: state.workload_exit_code,
                        tracked_pids: state.tracked_pids,
                    })
                }
                Err(failure) => {
                    error!(phase = %failure.phase, reason = %failure.reason, "Scenario failed");
                    RunOutcome::FailedAtPhase {
                        phase: failure.phase,
                        reason: failure.reason,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, scenario: &Scenario, state: &mut RunState) -> StepResult<()> {
        // Initial
        let mut handle = self
            .control
            .start(scenario.start_request())
            .await
            .map_err(|e| StepFailure::new(PHASE_START, FailureReason::ControlSurface(e.to_string())))?;
        info!(pid = ?handle.pid(), image = ?scenario.start_request().image, "Start action launched");

        if let Err(failure) = self.await_readiness(scenario, &*handle, state).await {
            abandon(&mut *handle).await;
            return Err(failure);
        }

        // WorkloadCompletion
        state.workload_exit_code = self.complete_workload(scenario, &mut *handle).await?;

        // Teardown
        state.tracked_pids = self.capture_tracked_pids(scenario).await?;
        self.stop().await?;

        // TeardownVerification
        for pid in &state.tracked_pids {
            let outcome = self
                .waiter
                .wait(&Probe::process_exited(*pid), scenario.teardown_policy())
                .await;
            if !outcome.is_ready() {
                return Err(StepFailure::new(
                    PHASE_TEARDOWN_VERIFICATION,
                    FailureReason::ProcessStillRunning {
                        pid: *pid,
                        timeout: scenario.teardown_policy().timeout(),
                    },
                ));
            }
            info!(pid = %pid, "Tracked process exited");
        }

        Ok(())
    }

    /// Startup marker, then the declared phases in order
    async fn await_readiness(
        &self,
        scenario: &Scenario,
        handle: &dyn RunningCommand,
        state: &mut RunState,
    ) -> StepResult<()> {
        if let Some(marker) = scenario.startup_marker() {
            let text = marker.text.as_str();
            let outcome = self
                .waiter
                .wait_until(text, marker.policy, move || async move {
                    handle.output_contains(text)
                })
                .await;
            expect_ready(PHASE_CONTROL_SURFACE_STARTED, marker.policy.timeout(), outcome)?;
            info!(marker = %text, "Control surface reported startup");
        }

        // PhaseLoop
        for phase in scenario.phases() {
            info!(phase = %phase.name(), probe = %phase.probe(), "Waiting for phase");
            let outcome = self.waiter.wait(phase.probe(), phase.policy()).await;
            expect_ready(phase.name(), phase.policy().timeout(), outcome)?;

            info!(
                phase = %phase.name(),
                elapsed_ms = %outcome.elapsed().as_millis(),
                "Phase ready"
            );
            state.phases.push(PhaseReport {
                name: phase.name().to_string(),
                elapsed_ms: outcome.elapsed().as_millis() as u64,
                checks: outcome.checks(),
            });
        }

        Ok(())
    }

    async fn complete_workload(
        &self,
        scenario: &Scenario,
        handle: &mut dyn RunningCommand,
    ) -> StepResult<Option<i32>> {
        match scenario.completion() {
            Completion::AwaitExit {
                expected_code,
                timeout,
            } => {
                let started = tokio::time::Instant::now();
                let waited = tokio::time::timeout(timeout, handle.wait()).await;
                match waited {
                    Ok(Ok(code)) if code == Some(expected_code) => {
                        info!(exit_code = %expected_code, "Workload completed");
                        Ok(code)
                    }
                    Ok(Ok(code)) => Err(StepFailure::new(
                        PHASE_WORKLOAD_COMPLETION,
                        FailureReason::UnexpectedExit {
                            expected: expected_code,
                            actual: code,
                        },
                    )),
                    Ok(Err(e)) => Err(StepFailure::new(
                        PHASE_WORKLOAD_COMPLETION,
                        FailureReason::ControlSurface(e.to_string()),
                    )),
                    Err(_) => {
                        abandon(handle).await;
                        Err(StepFailure::new(
                            PHASE_WORKLOAD_COMPLETION,
                            FailureReason::Timeout {
                                timeout,
                                elapsed: started.elapsed(),
                            },
                        ))
                    }
                }
            }
            Completion::Terminate => {
                handle.interrupt().await.map_err(|e| {
                    StepFailure::new(
                        PHASE_WORKLOAD_COMPLETION,
                        FailureReason::ControlSurface(e.to_string()),
                    )
                })?;
                info!("Start action interrupted");
                Ok(None)
            }
        }
    }

    /// Read the pid files of tracking phases (before stop removes them)
    async fn capture_tracked_pids(&self, scenario: &Scenario) -> StepResult<Vec<Pid>> {
        let mut pids = Vec::new();
        for path in scenario.phases().iter().filter_map(|p| p.pid_file()) {
            let content = self.observer.read_file(path).await.map_err(|e| {
                StepFailure::new(
                    PHASE_TEARDOWN,
                    FailureReason::PidCapture(format!("{}: {}", path.display(), e)),
                )
            })?;
            let pid = Pid::parse_pid_file(&content).map_err(|e| {
                StepFailure::new(
                    PHASE_TEARDOWN,
                    FailureReason::PidCapture(format!("{}: {}", path.display(), e)),
                )
            })?;
            info!(pid = %pid, pid_file = %path.display(), "Tracking process for teardown");
            pids.push(pid);
        }
        Ok(pids)
    }

    async fn stop(&self) -> StepResult<()> {
        let report = self.control.stop().await.map_err(|e| {
            StepFailure::new(PHASE_TEARDOWN, FailureReason::ControlSurface(e.to_string()))
        })?;
        if !report.success() {
            return Err(StepFailure::new(
                PHASE_TEARDOWN,
                FailureReason::UnexpectedExit {
                    expected: 0,
                    actual: report.exit_code,
                },
            ));
        }
        info!("Stop action succeeded");
        Ok(())
    }
}

fn expect_ready(phase: &str, timeout: Duration, outcome: WaitOutcome) -> StepResult<()> {
    match outcome {
        WaitOutcome::Ready { .. } => Ok(()),
        WaitOutcome::TimedOut { elapsed, .. } => Err(StepFailure::new(
            phase,
            FailureReason::Timeout { timeout, elapsed },
        )),
    }
}

/// Best-effort interrupt of a start action we no longer care about
async fn abandon(handle: &mut dyn RunningCommand) {
    if let Err(e) = handle.interrupt().await {
        warn!(pid = ?handle.pid(), error = %e, "Failed to interrupt start action");
    }
}
