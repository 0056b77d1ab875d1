// Lifecycle constants (No magic values)
use std::time::Duration;

/// Phase name reported when the start action cannot be launched
pub const PHASE_START: &str = "start";

/// Phase name for the startup marker wait
pub const PHASE_CONTROL_SURFACE_STARTED: &str = "control-surface-started";

/// Phase name for the start action's own completion
pub const PHASE_WORKLOAD_COMPLETION: &str = "workload-completion";

/// Phase name for pid capture and the stop action
pub const PHASE_TEARDOWN: &str = "teardown";

/// Phase name for tracked pid exit checks
pub const PHASE_TEARDOWN_VERIFICATION: &str = "teardown-verification";

/// Reference phase names, in execution order
pub const PHASE_NETWORK_PROXY_CONFIG: &str = "network-proxy-config";
pub const PHASE_NETWORK_VIRTUALIZATION_READY: &str = "network-virtualization-ready";
pub const PHASE_GUEST_INIT_READY: &str = "guest-init-ready";
pub const PHASE_HYPERVISOR_READY: &str = "hypervisor-ready";
pub const PHASE_CONTAINER_RUNTIME_READY: &str = "container-runtime-ready";
pub const PHASE_CONTROL_PLANE_READY: &str = "control-plane-ready";
pub const PHASE_INGRESS_READY: &str = "ingress-ready";

/// Line printed by the control surface once the network-virtualization process launches
pub const STARTUP_MARKER: &str = "Starting VPNKit";

/// Startup marker deadline (20 minutes: includes image download on first run)
pub const STARTUP_MARKER_TIMEOUT_SECS: u64 = 20 * 60;

/// Pid / config file phases (10s)
pub const FILE_PHASE_TIMEOUT_SECS: u64 = 10;

/// Hypervisor pid file (120s: disk provisioning happens before it is written)
pub const HYPERVISOR_TIMEOUT_SECS: u64 = 120;

/// Container runtime listener (6 minutes)
pub const CONTAINER_RUNTIME_TIMEOUT_SECS: u64 = 360;

/// Control plane listener (8 minutes)
pub const CONTROL_PLANE_TIMEOUT_SECS: u64 = 480;

/// Ingress listener (20 minutes: full platform deploy)
pub const INGRESS_TIMEOUT_SECS: u64 = 1200;

/// Start action exit after deploy (5 minutes)
pub const WORKLOAD_COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-pid exit check after the stop action (5s)
pub const TEARDOWN_VERIFICATION_TIMEOUT_SECS: u64 = 5;

/// Default number of verify scans after the kill pass
pub const DEFAULT_REAP_VERIFY_ATTEMPTS: u32 = 1;

/// Pause between verify scans when more than one is configured (250ms)
pub const DEFAULT_REAP_VERIFY_INTERVAL: Duration = Duration::from_millis(250);

/// Grace period between SIGTERM and SIGKILL when interrupting the start action (5s)
pub const GRACEFUL_INTERRUPT_TIMEOUT: Duration = Duration::from_secs(5);
