// Scenario Domain Model
// A scenario is declared up front, executed exactly once, then discarded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{DomainError, Result};
use super::probe::{PollPolicy, Probe};

/// One named, ordered readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    name: String,
    probe: Probe,
    policy: PollPolicy,
    tracks_pid: bool,
}

impl Phase {
    pub fn new(name: impl Into<String>, probe: Probe, policy: PollPolicy) -> Self {
        Self {
            name: name.into(),
            probe,
            policy,
            tracks_pid: false,
        }
    }

    /// Capture the pid written to this phase's file for teardown verification
    ///
    /// Only valid for `FileExists` probes (the file is a pid file).
    pub fn tracking_pid(mut self) -> Result<Self> {
        if self.probe.path().is_none() {
            return Err(DomainError::ValidationError(format!(
                "phase '{}' tracks a pid but does not watch a pid file",
                self.name
            )));
        }
        self.tracks_pid = true;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Pid file to read before teardown, if this phase tracks a pid
    pub fn pid_file(&self) -> Option<&Path> {
        if self.tracks_pid {
            self.probe.path()
        } else {
            None
        }
    }
}

/// Arguments for the control surface start action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    /// Custom environment image (`start -f <image>`)
    pub image: Option<PathBuf>,
}

/// Text the control surface prints once booting has begun
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMarker {
    pub text: String,
    pub policy: PollPolicy,
}

/// How the workload phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Wait for the start action to exit with `expected_code` within `timeout`
    AwaitExit { expected_code: i32, timeout: Duration },
    /// Interrupt the start action once all phases are ready; any exit status is accepted
    Terminate,
}

/// End-to-end lifecycle scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    start: StartRequest,
    startup_marker: Option<StartupMarker>,
    phases: Vec<Phase>,
    completion: Completion,
    teardown_policy: PollPolicy,
}

impl Scenario {
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            start: StartRequest::default(),
            startup_marker: None,
            phases: Vec::new(),
            completion: Completion::Terminate,
            teardown_policy: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_request(&self) -> &StartRequest {
        &self.start
    }

    pub fn startup_marker(&self) -> Option<&StartupMarker> {
        self.startup_marker.as_ref()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn teardown_policy(&self) -> PollPolicy {
        self.teardown_policy
    }
}

pub struct ScenarioBuilder {
    name: String,
    start: StartRequest,
    startup_marker: Option<StartupMarker>,
    phases: Vec<Phase>,
    completion: Completion,
    teardown_policy: Option<PollPolicy>,
}

impl ScenarioBuilder {
    pub fn start(mut self, request: StartRequest) -> Self {
        self.start = request;
        self
    }

    pub fn startup_marker(mut self, text: impl Into<String>, policy: PollPolicy) -> Self {
        self.startup_marker = Some(StartupMarker {
            text: text.into(),
            policy,
        });
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    pub fn teardown_policy(mut self, policy: PollPolicy) -> Self {
        self.teardown_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<Scenario> {
        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.name()) {
                return Err(DomainError::DuplicatePhase(phase.name().to_string()));
            }
        }

        let teardown_policy = match self.teardown_policy {
            Some(policy) => policy,
            None => PollPolicy::every_second(5)?,
        };

        Ok(Scenario {
            name: self.name,
            start: self.start,
            startup_marker: self.startup_marker,
            phases: self.phases,
            completion: self.completion,
            teardown_policy,
        })
    }
}
