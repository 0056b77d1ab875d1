// Control Surface Port
// Abstraction over the external tool that starts and stops the environment

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Pid, StartRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlSurfaceError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Control surface timeout after {0:?}")]
    Timeout(Duration),
}

/// Outcome of the stop action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// None if the action was killed by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

impl StopReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Execution handle of a running start action
#[async_trait]
pub trait RunningCommand: Send + Sync {
    fn pid(&self) -> Option<Pid>;

    /// true if stdout or stderr produced so far contains `needle`
    fn output_contains(&self, needle: &str) -> bool;

    /// Wait for exit; returns the exit code (None if killed by a signal)
    async fn wait(&mut self) -> Result<Option<i32>, ControlSurfaceError>;

    /// Ask the command to stop (SIGTERM, then SIGKILL after a grace period) and reap it
    async fn interrupt(&mut self) -> Result<(), ControlSurfaceError>;
}

/// Control Surface trait
///
/// Implementations:
/// - CommandControlSurface: runs an external executable (`cf dev start|stop`)
#[async_trait]
pub trait ControlSurface: Send + Sync {
    /// Launch the start action without waiting for it
    ///
    /// # Errors
    /// - ControlSurfaceError::SpawnFailed if the executable cannot be started
    async fn start(
        &self,
        request: &StartRequest,
    ) -> Result<Box<dyn RunningCommand>, ControlSurfaceError>;

    /// Run the stop action to completion
    async fn stop(&self) -> Result<StopReport, ControlSurfaceError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted start action
    #[derive(Debug, Clone)]
    pub struct MockStart {
        pub output: String,
        /// Exit code reported by `wait`; None = never exits (wait pends)
        pub exit_code: Option<i32>,
    }

    type StartHook = Box<dyn Fn() + Send + Sync>;

    /// Mock control surface recording every action
    pub struct MockControlSurface {
        start: Mutex<Option<MockStart>>,
        on_start: Mutex<Option<StartHook>>,
        stop_exit_code: Mutex<Option<i32>>,
        events: Arc<Mutex<Vec<String>>>,
        requests: Mutex<Vec<StartRequest>>,
    }

    impl MockControlSurface {
        /// Start prints `output` and exits 0; stop exits 0
        pub fn new(output: impl Into<String>) -> Self {
            Self {
                start: Mutex::new(Some(MockStart {
                    output: output.into(),
                    exit_code: Some(0),
                })),
                on_start: Mutex::new(None),
                stop_exit_code: Mutex::new(Some(0)),
                events: Arc::new(Mutex::new(Vec::new())),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn set_start(&self, start: Option<MockStart>) {
            *self.start.lock().unwrap() = start;
        }

        /// Run `hook` whenever start succeeds (e.g. to spawn processes in a mock table)
        pub fn on_start(&self, hook: impl Fn() + Send + Sync + 'static) {
            *self.on_start.lock().unwrap() = Some(Box::new(hook));
        }

        pub fn set_stop_exit_code(&self, code: Option<i32>) {
            *self.stop_exit_code.lock().unwrap() = code;
        }

        /// "start", "wait", "interrupt", "stop" in call order
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        pub fn requests(&self) -> Vec<StartRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    struct MockRunning {
        script: MockStart,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RunningCommand for MockRunning {
        fn pid(&self) -> Option<Pid> {
            Pid::new(4000).ok()
        }

        fn output_contains(&self, needle: &str) -> bool {
            self.script.output.contains(needle)
        }

        async fn wait(&mut self) -> Result<Option<i32>, ControlSurfaceError> {
            self.events.lock().unwrap().push("wait".to_string());
            match self.script.exit_code {
                Some(code) => Ok(Some(code)),
                None => std::future::pending().await,
            }
        }

        async fn interrupt(&mut self) -> Result<(), ControlSurfaceError> {
            self.events.lock().unwrap().push("interrupt".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl ControlSurface for MockControlSurface {
        async fn start(
            &self,
            request: &StartRequest,
        ) -> Result<Box<dyn RunningCommand>, ControlSurfaceError> {
            self.events.lock().unwrap().push("start".to_string());
            self.requests.lock().unwrap().push(request.clone());

            let script = self.start.lock().unwrap().clone().ok_or_else(|| {
                ControlSurfaceError::SpawnFailed("mock: executable not found".to_string())
            })?;
            if let Some(hook) = self.on_start.lock().unwrap().as_ref() {
                hook();
            }

            Ok(Box::new(MockRunning {
                script,
                events: self.events.clone(),
            }))
        }

        async fn stop(&self) -> Result<StopReport, ControlSurfaceError> {
            self.events.lock().unwrap().push("stop".to_string());
            Ok(StopReport {
                exit_code: *self.stop_exit_code.lock().unwrap(),
                output: String::new(),
            })
        }
    }
}
