//! End-to-end scenarios with real adapters
//!
//! A shell script stands in for the control tool. `start` prints the startup
//! marker, writes the proxy config and pid files of three background
//! processes into `$CFDEV_HOME`, then exits 0. The background processes keep
//! the tool's stdout and stderr open, as real daemons do. `stop` terminates them.
//! Listener phases target TCP listeners bound by the test.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use lifecheck_core::application::{
    Harness, LifecycleSequencer, ProcessReaper, ProcessScanner, ReapPolicy,
};
use lifecheck_core::domain::{
    Completion, Component, EnvironmentConfig, Phase, PollPolicy, Probe, ProcessPatterns, Scenario,
};
use lifecheck_core::LifecycleError;
use lifecheck_infra_system::{
    CommandControlSurface, ControlSurfaceConfig, SignalTerminator, SysinfoProcessTable,
    SystemReadinessObserver,
};

const FAKE_CONTROL_TOOL: &str = r#"
state="$CFDEV_HOME/state"

spawn() {
  sh -c 'while :; do sleep 1; done' "$LIFECHECK_TEST_MARKER-$1" &
  echo $! > "$state/$1.pid"
}

case "$2" in
  start)
    mkdir -p "$state"
    echo "Downloading environment..."
    echo "Starting VPNKit"
    echo '{}' > "$CFDEV_HOME/http_proxy.json"
    spawn vpnkit
    spawn linuxkit
    if [ "$FAKE_HYPERKIT" = 1 ]; then spawn hyperkit; fi
    echo "Deployed"
    exit 0
    ;;
  stop)
    if [ "$FAKE_STOP_KILLS" = 1 ]; then
      for f in "$state"/*.pid; do
        [ -f "$f" ] && kill "$(cat "$f")"
        rm -f "$f"
      done
    fi
    exit 0
    ;;
esac
exit 64
"#;

struct Environment {
    home: TempDir,
    marker: String,
    tool: PathBuf,
}

impl Environment {
    fn new() -> Self {
        let home = tempfile::tempdir().unwrap();
        let tool = home.path().join("fake-cf.sh");
        std::fs::write(&tool, FAKE_CONTROL_TOOL).unwrap();
        Self {
            home,
            marker: format!("lifecheck-e2e-{}", uuid::Uuid::new_v4().simple()),
            tool,
        }
    }

    fn config(&self) -> EnvironmentConfig {
        let mut config = EnvironmentConfig::new(self.home.path());
        config.patterns = ProcessPatterns::new([self.marker.as_str()]);
        config
    }

    /// `sh <script> dev <action>`, so the script needs no exec bit
    fn control(&self, spawn_hyperkit: bool, stop_kills: bool) -> Arc<CommandControlSurface> {
        let mut config = ControlSurfaceConfig::new(
            "sh",
            vec![self.tool.display().to_string(), "dev".to_string()],
        );
        let flag = |on: bool| String::from(if on { "1" } else { "0" });
        config.extra_env.extend([
            ("CFDEV_HOME".to_string(), self.home.path().display().to_string()),
            ("LIFECHECK_TEST_MARKER".to_string(), self.marker.clone()),
            ("FAKE_HYPERKIT".to_string(), flag(spawn_hyperkit)),
            ("FAKE_STOP_KILLS".to_string(), flag(stop_kills)),
        ]);
        config.stop_timeout = Duration::from_secs(10);
        Arc::new(CommandControlSurface::new(config))
    }

    fn harness(&self, control: Arc<CommandControlSurface>) -> Harness {
        let observer = Arc::new(SystemReadinessObserver::new(Duration::from_millis(500)).unwrap());
        Harness::new(
            LifecycleSequencer::new(control.clone(), observer),
            reaper(),
            control,
            self.config().patterns,
        )
    }
}

fn reaper() -> ProcessReaper {
    ProcessReaper::new(
        ProcessScanner::new(Arc::new(SysinfoProcessTable::new())),
        Arc::new(SignalTerminator::new()),
        ReapPolicy {
            verify_attempts: 20,
            verify_interval: Duration::from_millis(100),
        },
    )
}

fn quick(timeout_secs: u64) -> PollPolicy {
    PollPolicy::new(Duration::from_secs(timeout_secs), Duration::from_millis(100)).unwrap()
}

fn pid_phase(name: &str, path: &Path) -> Phase {
    Phase::new(name, Probe::file_exists(path), quick(5))
        .tracking_pid()
        .unwrap()
}

fn scenario(env: &EnvironmentConfig, listener: &str) -> Scenario {
    Scenario::builder("e2e")
        .startup_marker("Starting VPNKit", quick(10))
        .phase(Phase::new(
            "network-proxy-config",
            Probe::file_exists(env.proxy_config_path()),
            quick(5),
        ))
        .phase(pid_phase(
            "network-virtualization-ready",
            &env.pid_file(Component::NetworkVirtualization),
        ))
        .phase(pid_phase("guest-init-ready", &env.pid_file(Component::GuestInit)))
        .phase(Phase::new(
            "hypervisor-ready",
            Probe::file_exists(env.pid_file(Component::Hypervisor)),
            quick(2),
        ))
        .phase(Phase::new(
            "container-runtime-ready",
            Probe::network_listening(listener),
            quick(5),
        ))
        .completion(Completion::AwaitExit {
            expected_code: 0,
            timeout: Duration::from_secs(10),
        })
        .teardown_policy(quick(5))
        .build()
        .unwrap()
}

async fn leftovers(patterns: &ProcessPatterns) -> usize {
    ProcessScanner::new(Arc::new(SysinfoProcessTable::new()))
        .scan(patterns)
        .await
        .unwrap()
        .len()
}

/// Scenario A: full boot, deploy, stop, tracked pids exit
#[tokio::test]
async fn test_happy_path_completes_and_leaves_nothing_behind() {
    let environment = Environment::new();
    let config = environment.config();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", listener.local_addr().unwrap());

    let harness = environment.harness(environment.control(true, true));
    let report = harness.run(&scenario(&config, &address)).await.unwrap();

    let phases: Vec<&str> = report.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        phases,
        vec![
            "network-proxy-config",
            "network-virtualization-ready",
            "guest-init-ready",
            "hypervisor-ready",
            "container-runtime-ready",
        ]
    );
    assert_eq!(report.workload_exit_code, Some(0));
    assert_eq!(report.tracked_pids.len(), 2);
    assert_eq!(leftovers(&config.patterns).await, 0);
    println!("✅ Scenario A: completed with a clean process table");
}

/// A missing pid file fails its phase; later phases are never reached and the
/// processes the tool left behind are reaped
#[tokio::test]
async fn test_failed_phase_is_reported_and_cleaned_up() {
    let environment = Environment::new();
    let config = environment.config();

    let harness = environment.harness(environment.control(false, false));
    let result = harness
        .run(&scenario(&config, "tcp://127.0.0.1:1"))
        .await;

    match result {
        Err(LifecycleError::ProbeTimeout { phase, timeout, elapsed }) => {
            assert_eq!(phase, "hypervisor-ready");
            assert!(elapsed >= timeout);
        }
        other => panic!("expected a probe timeout, got {:?}", other),
    }
    assert_eq!(leftovers(&config.patterns).await, 0);
    println!("✅ Fail-fast: failing phase named, environment reaped");
}

/// Scenario B: a stray process from an earlier run is reaped before start
#[tokio::test]
async fn test_stray_process_is_reaped_before_start() {
    let environment = Environment::new();
    let config = environment.config();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("tcp://{}", listener.local_addr().unwrap());

    let mut stray = tokio::process::Command::new("sh")
        .arg("-c")
        .arg("while :; do sleep 1; done")
        .arg(format!("{}-hyperkit", environment.marker))
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let harness = environment.harness(environment.control(true, true));
    let report = harness.run(&scenario(&config, &address)).await.unwrap();

    assert_eq!(report.phases.len(), 5);
    let status = stray.wait().await.unwrap();
    assert!(!status.success());
    println!("✅ Scenario B: stray process killed before the scenario");
}
