// Readiness observer implementation
// reason: tokio fs/net for file and tcp checks, reqwest for http(s) listeners,
// nix + sysinfo for process exit checks
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{ProcessStatus, System};
use tracing::debug;

use lifecheck_core::domain::Pid;
use lifecheck_core::port::{ObserveError, ReadinessObserver};

/// Default per-request deadline for a single listener check (5s)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Observes files, listeners and processes on the local machine
pub struct SystemReadinessObserver {
    http: reqwest::Client,
    request_timeout: Duration,
    system: Arc<Mutex<System>>,
}

impl SystemReadinessObserver {
    /// # Arguments
    /// * `request_timeout` - deadline of one connection attempt; must be shorter
    ///   than the poll interval of the phases using it to keep polling regular
    pub fn new(request_timeout: Duration) -> Result<Self, ObserveError> {
        // The environment's control plane serves a self-signed certificate
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ObserveError::Network(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            request_timeout,
            system: Arc::new(Mutex::new(System::new())),
        })
    }

    async fn tcp_accepts(&self, host: &str, port: u16) -> bool {
        let connect = tokio::net::TcpStream::connect((host, port));
        match tokio::time::timeout(self.request_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %host, port = %port, error = %e, "Connection refused");
                false
            }
            Err(_) => {
                debug!(host = %host, port = %port, "Connection attempt timed out");
                false
            }
        }
    }

    async fn http_answers(&self, url: reqwest::Url) -> bool {
        // Any HTTP response (including 4xx/5xx) proves the listener is up
        match self.http.get(url.clone()).send().await {
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Listener answered");
                true
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Listener not answering");
                false
            }
        }
    }

    fn is_zombie(&self, pid: Pid) -> Result<bool, ObserveError> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| ObserveError::Process("process table lock poisoned".to_string()))?;
        let pid = sysinfo::Pid::from_u32(pid.as_u32());
        if !sys.refresh_process(pid) {
            return Ok(true);
        }
        Ok(sys
            .process(pid)
            .map_or(true, |p| p.status() == ProcessStatus::Zombie))
    }
}

/// Parse a listener address into a URL with scheme `tcp`, `http` or `https`
///
/// Accepts `tcp://host:port`, `http(s)://host[:port][/path]` and bare `host:port`.
pub fn parse_listener_address(address: &str) -> Result<reqwest::Url, ObserveError> {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("tcp://{}", address)
    };
    let url = reqwest::Url::parse(&with_scheme)
        .map_err(|e| ObserveError::InvalidAddress(format!("{}: {}", address, e)))?;

    if url.host_str().is_none() {
        return Err(ObserveError::InvalidAddress(format!("{}: missing host", address)));
    }
    match url.scheme() {
        "http" | "https" => Ok(url),
        "tcp" if url.port().is_some() => Ok(url),
        "tcp" => Err(ObserveError::InvalidAddress(format!("{}: missing port", address))),
        other => Err(ObserveError::InvalidAddress(format!(
            "{}: unsupported scheme '{}'",
            address, other
        ))),
    }
}

#[async_trait]
impl ReadinessObserver for SystemReadinessObserver {
    async fn file_exists(&self, path: &Path) -> Result<bool, ObserveError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| ObserveError::Io(format!("{}: {}", path.display(), e)))
    }

    async fn is_listening(&self, address: &str) -> Result<bool, ObserveError> {
        let url = parse_listener_address(address)?;
        match url.scheme() {
            "tcp" => {
                let host = url.host_str().unwrap_or_default();
                let port = url.port().unwrap_or_default();
                Ok(self.tcp_accepts(host, port).await)
            }
            _ => Ok(self.http_answers(url).await),
        }
    }

    async fn has_exited(&self, pid: Pid) -> Result<bool, ObserveError> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;

            // Signal 0 checks existence without delivering anything
            match kill(nix::unistd::Pid::from_raw(pid.as_i32()), None) {
                Err(Errno::ESRCH) => return Ok(true),
                Ok(()) | Err(Errno::EPERM) => {}
                Err(e) => return Err(ObserveError::Process(format!("pid {}: {}", pid, e))),
            }
        }

        // Still in the table: exited only if it is a zombie
        self.is_zombie(pid)
    }

    async fn read_file(&self, path: &Path) -> Result<String, ObserveError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ObserveError::Io(format!("{}: {}", path.display(), e)))
    }
}
