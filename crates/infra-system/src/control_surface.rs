// Control surface implementation
// reason: tokio::process for async child management, nix for SIGTERM on unix
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifecheck_core::application::constants::GRACEFUL_INTERRUPT_TIMEOUT;
use lifecheck_core::domain::{Pid, StartRequest};
use lifecheck_core::port::{ControlSurface, ControlSurfaceError, RunningCommand, StopReport};

/// How long readers may keep flushing once the start action has exited.
/// A daemon that inherited the tool's stdio keeps the pipes open past this.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for the stop action (60s)
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Variables passed through from the caller's environment by default
pub const DEFAULT_ENV_ALLOWLIST: [&str; 6] = ["PATH", "HOME", "USER", "CFDEV_HOME", "TMPDIR", "LANG"];

/// How to invoke the external control tool
#[derive(Debug, Clone)]
pub struct ControlSurfaceConfig {
    /// Executable (`cf`)
    pub program: PathBuf,
    /// Arguments placed before the action (`dev`)
    pub base_args: Vec<String>,
    /// Caller environment variables forwarded to the tool
    pub env_allowlist: Vec<String>,
    /// Extra variables set on the tool (e.g. CFDEV_HOME for the configured home)
    pub extra_env: HashMap<String, String>,
    pub stop_timeout: Duration,
}

impl ControlSurfaceConfig {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|v| v.to_string()).collect(),
            extra_env: HashMap::new(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Runs `<program> <base_args> start [-f <image>]` and `<program> <base_args> stop`
pub struct CommandControlSurface {
    config: ControlSurfaceConfig,
}

impl CommandControlSurface {
    pub fn new(config: ControlSurfaceConfig) -> Self {
        Self { config }
    }

    /// Caller environment restricted to the allowlist
    fn filter_env(&self, env: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        env.filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    fn command(&self, action_args: &[String]) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.base_args)
            .args(action_args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .envs(&self.config.extra_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, e: std::io::Error) -> ControlSurfaceError {
        ControlSurfaceError::SpawnFailed(format!("{}: {}", self.config.program.display(), e))
    }
}

fn start_args(request: &StartRequest) -> Vec<String> {
    let mut args = vec!["start".to_string()];
    if let Some(image) = &request.image {
        args.push("-f".to_string());
        args.push(image.display().to_string());
    }
    args
}

/// Append every line of `stream` to `sink`, logging it with a `[label]` prefix
///
/// Lines are decoded lossily and reading continues until EOF, so a stray
/// non-UTF-8 byte never closes the pipe under the tool.
fn capture<R>(stream: Option<R>, label: &'static str, sink: Arc<Mutex<String>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    Some(tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let decoded = String::from_utf8_lossy(&buf);
                    let line = decoded.trim_end_matches(|c: char| c == '\n' || c == '\r');
                    debug!("[{}] {}", label, line);
                    if let Ok(mut output) = sink.lock() {
                        output.push_str(line);
                        output.push('\n');
                    }
                }
                Err(e) => {
                    warn!(stream = label, error = %e, "Output reader failed");
                    break;
                }
            }
        }
    }))
}

#[async_trait]
impl ControlSurface for CommandControlSurface {
    async fn start(
        &self,
        request: &StartRequest,
    ) -> Result<Box<dyn RunningCommand>, ControlSurfaceError> {
        let args = start_args(request);
        info!(
            program = %self.config.program.display(),
            base_args = ?self.config.base_args,
            args = ?args,
            "Launching start action"
        );

        let mut child = self.command(&args).spawn().map_err(|e| self.spawn_error(e))?;
        let pid = child.id().and_then(|id| Pid::new(i64::from(id)).ok());

        let output = Arc::new(Mutex::new(String::new()));
        let readers = [
            capture(child.stdout.take(), "start", output.clone()),
            capture(child.stderr.take(), "start", output.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Box::new(ChildHandle {
            child,
            pid,
            output,
            readers,
        }))
    }

    async fn stop(&self) -> Result<StopReport, ControlSurfaceError> {
        info!(program = %self.config.program.display(), "Running stop action");

        let child = self
            .command(&["stop".to_string()])
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let output = match tokio::time::timeout(self.config.stop_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ControlSurfaceError::IoError(e.to_string())),
            Err(_) => return Err(ControlSurfaceError::Timeout(self.config.stop_timeout)),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        for line in combined.lines() {
            debug!("[stop] {}", line);
        }

        let report = StopReport {
            exit_code: output.status.code(),
            output: combined,
        };
        info!(exit_code = ?report.exit_code, "Stop action finished");
        Ok(report)
    }
}

/// Handle on a running start action
struct ChildHandle {
    child: Child,
    pid: Option<Pid>,
    output: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildHandle {
    /// Let the reader tasks flush what the child wrote before exiting
    ///
    /// Readers still blocked after the deadline are detached, not aborted:
    /// they keep capturing and end at EOF, and the daemon holding the pipe
    /// never sees it closed.
    async fn drain(&mut self) {
        for mut reader in self.readers.drain(..) {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
                debug!(pid = ?self.pid, "Output still held open by a descendant, detaching reader");
            }
        }
    }

    /// SIGTERM, then SIGKILL if the child is still alive after the grace period
    async fn kill_graceful(&mut self) -> Result<(), ControlSurfaceError> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{kill, Signal};

            info!(pid = %pid, "Sending SIGTERM to start action");
            if let Err(e) = kill(nix::unistd::Pid::from_raw(pid.as_i32()), Signal::SIGTERM) {
                warn!(pid = %pid, error = %e, "SIGTERM failed");
            }
            if let Ok(waited) = tokio::time::timeout(GRACEFUL_INTERRUPT_TIMEOUT, self.child.wait()).await {
                let status = waited.map_err(|e| ControlSurfaceError::IoError(e.to_string()))?;
                info!(pid = %pid, exit_code = ?status.code(), "Start action exited after SIGTERM");
                return Ok(());
            }
            warn!(pid = %pid, "Start action ignored SIGTERM, sending SIGKILL");
        }

        self.child
            .kill()
            .await
            .map_err(|e| ControlSurfaceError::IoError(format!("kill failed: {}", e)))
    }
}

#[async_trait]
impl RunningCommand for ChildHandle {
    fn pid(&self) -> Option<Pid> {
        self.pid
    }

    fn output_contains(&self, needle: &str) -> bool {
        self.output
            .lock()
            .map(|output| output.contains(needle))
            .unwrap_or(false)
    }

    async fn wait(&mut self) -> Result<Option<i32>, ControlSurfaceError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ControlSurfaceError::IoError(e.to_string()))?;
        self.drain().await;
        info!(pid = ?self.pid, exit_code = ?status.code(), "Start action exited");
        Ok(status.code())
    }

    async fn interrupt(&mut self) -> Result<(), ControlSurfaceError> {
        let already_exited = self
            .child
            .try_wait()
            .map_err(|e| ControlSurfaceError::IoError(e.to_string()))?
            .is_some();
        if !already_exited {
            self.kill_graceful().await?;
        }
        self.drain().await;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio_test::assert_ok;

    fn sh(script: &str) -> CommandControlSurface {
        CommandControlSurface::new(ControlSurfaceConfig::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "cf-dev".to_string()],
        ))
    }

    #[test]
    fn test_start_args() {
        assert_eq!(start_args(&StartRequest::default()), vec!["start"]);
        assert_eq!(
            start_args(&StartRequest {
                image: Some(PathBuf::from("/tmp/custom.iso"))
            }),
            vec!["start", "-f", "/tmp/custom.iso"]
        );
    }

    #[test]
    fn test_env_filtering() {
        let surface = sh("true");
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "hunter2".to_string()),
        ];

        let filtered = surface.filter_env(env.into_iter());

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("PATH"));
    }

    #[tokio::test]
    async fn test_start_captures_output_and_exit_code() {
        // $1 is the action; "$@" = start -f <image>
        let surface = sh(r#"echo "action=$1 image=$3"; echo "Starting VPNKit" >&2; exit 3"#);
        let request = StartRequest {
            image: Some(Path::new("/tmp/custom.iso").to_path_buf()),
        };

        let mut handle = surface.start(&request).await.unwrap();
        let code = handle.wait().await.unwrap();

        assert_eq!(code, Some(3));
        assert!(handle.output_contains("action=start image=/tmp/custom.iso"));
        assert!(handle.output_contains("Starting VPNKit"));
        assert!(handle.pid().is_some());
    }

    #[tokio::test]
    async fn test_extra_env_reaches_the_tool() {
        let mut config = ControlSurfaceConfig::new(
            "sh",
            vec!["-c".to_string(), "echo home=$CFDEV_HOME".to_string()],
        );
        config
            .extra_env
            .insert("CFDEV_HOME".to_string(), "/tmp/lifecheck-home".to_string());

        let mut handle = CommandControlSurface::new(config)
            .start(&StartRequest::default())
            .await
            .unwrap();
        handle.wait().await.unwrap();

        assert!(handle.output_contains("home=/tmp/lifecheck-home"));
    }

    #[tokio::test]
    async fn test_interrupt_stops_long_running_start() {
        let surface = sh("echo booting; while :; do sleep 1; done");

        let mut handle = surface.start(&StartRequest::default()).await.unwrap();
        assert_ok!(handle.interrupt().await);

        assert!(handle.output_contains("booting"));
    }

    #[tokio::test]
    async fn test_wait_returns_while_daemon_holds_output_open() {
        let surface = sh("sleep 20 & echo 'Starting VPNKit'; exit 0");

        let mut handle = surface.start(&StartRequest::default()).await.unwrap();
        let code = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("wait must not block on inherited pipes")
            .unwrap();

        assert_eq!(code, Some(0));
        assert!(handle.output_contains("Starting VPNKit"));
    }

    #[tokio::test]
    async fn test_interrupt_returns_while_daemon_holds_output_open() {
        let surface = sh("sleep 20 & echo booting; while :; do sleep 1; done");

        let mut handle = surface.start(&StartRequest::default()).await.unwrap();
        let interrupted = tokio::time::timeout(Duration::from_secs(10), handle.interrupt())
            .await
            .expect("interrupt must not block on inherited pipes");

        assert_ok!(interrupted);
        assert!(handle.output_contains("booting"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_capture() {
        let surface = sh(concat!(
            "printf 'progress \\377\\n'; echo 'Starting VPNKit'; ",
            "i=0; while [ $i -lt 3000 ]; do echo \"line $i\"; i=$((i+1)); done; exit 0"
        ));

        let mut handle = surface.start(&StartRequest::default()).await.unwrap();
        let code = handle.wait().await.unwrap();

        assert_eq!(code, Some(0));
        assert!(handle.output_contains("progress \u{FFFD}"));
        assert!(handle.output_contains("Starting VPNKit"));
        assert!(handle.output_contains("line 2999"));
    }

    #[tokio::test]
    async fn test_interrupt_after_exit_is_noop() {
        let surface = sh("exit 0");

        let mut handle = surface.start(&StartRequest::default()).await.unwrap();
        handle.wait().await.unwrap();

        assert_ok!(handle.interrupt().await);
    }

    #[tokio::test]
    async fn test_stop_reports_exit_code() {
        let report = sh(r#"echo "stopping via $1"; exit 0"#).stop().await.unwrap();
        assert!(report.success());
        assert!(report.output.contains("stopping via stop"));

        let report = sh("exit 2").stop().await.unwrap();
        assert_eq!(report.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_stop_timeout() {
        let mut config = ControlSurfaceConfig::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
        );
        config.stop_timeout = Duration::from_millis(200);

        let result = CommandControlSurface::new(config).stop().await;

        assert!(matches!(result, Err(ControlSurfaceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let surface = CommandControlSurface::new(ControlSurfaceConfig::new(
            "/nonexistent/cf",
            vec!["dev".to_string()],
        ));

        let result = surface.start(&StartRequest::default()).await;

        assert!(matches!(result, Err(ControlSurfaceError::SpawnFailed(_))));
    }
}
