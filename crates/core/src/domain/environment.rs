// Environment Configuration
// Explicit value passed to the sequencer and reaper (no ambient globals).
// Paths are derived from the home root; nothing here is ever written.

use std::path::{Path, PathBuf};

use super::process::ProcessPatterns;

pub const DEFAULT_GARDEN_HOST: &str = "localhost";
pub const DEFAULT_BOSH_HOST: &str = "10.245.0.2";
pub const DEFAULT_ROUTER_HOST: &str = "10.144.0.34";

/// The three cooperating processes of the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// vpnkit: NAT / port forwarding between host and guest
    NetworkVirtualization,
    /// linuxkit: boots and supervises the guest services
    GuestInit,
    /// hyperkit: runs the guest virtual machine
    Hypervisor,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::NetworkVirtualization,
        Component::GuestInit,
        Component::Hypervisor,
    ];

    /// Substring identifying the component in a process command line
    pub fn process_pattern(&self) -> &'static str {
        match self {
            Component::NetworkVirtualization => "vpnkit",
            Component::GuestInit => "linuxkit",
            Component::Hypervisor => "hyperkit",
        }
    }

    pub fn pid_file_name(&self) -> String {
        format!("{}.pid", self.process_pattern())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub home: PathBuf,
    pub garden_host: String,
    pub bosh_host: String,
    pub router_host: String,
    pub patterns: ProcessPatterns,
}

impl EnvironmentConfig {
    /// Configuration with the default hosts and component patterns
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            garden_host: DEFAULT_GARDEN_HOST.to_string(),
            bosh_host: DEFAULT_BOSH_HOST.to_string(),
            router_host: DEFAULT_ROUTER_HOST.to_string(),
            patterns: ProcessPatterns::new(Component::ALL.iter().map(|c| c.process_pattern())),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.home.join("state")
    }

    pub fn pid_file(&self, component: Component) -> PathBuf {
        self.state_dir().join(component.pid_file_name())
    }

    /// Proxy settings handed to the network-virtualization process
    pub fn proxy_config_path(&self) -> PathBuf {
        self.home.join("http_proxy.json")
    }

    /// Container runtime (garden) API
    pub fn container_runtime_address(&self) -> String {
        format!("http://{}:8888", self.garden_host)
    }

    /// Control plane (BOSH director) API
    pub fn control_plane_address(&self) -> String {
        format!("https://{}:25555", self.bosh_host)
    }

    /// Ingress (CF router)
    pub fn ingress_address(&self) -> String {
        format!("http://{}:80", self.router_host)
    }
}
