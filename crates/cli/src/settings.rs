// Harness settings
// Layered: built-in defaults, then LIFECHECK_* environment variables.
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use lifecheck_core::application::ReapPolicy;
use lifecheck_core::domain::{Component, EnvironmentConfig, ProcessPatterns};
use lifecheck_core::domain::environment::{
    DEFAULT_BOSH_HOST, DEFAULT_GARDEN_HOST, DEFAULT_ROUTER_HOST,
};
use lifecheck_infra_system::ControlSurfaceConfig;

const ENV_PREFIX: &str = "LIFECHECK";
const DEFAULT_HOME: &str = "~/.cfdev";
const DEFAULT_CONTROL_PROGRAM: &str = "cf";
const DEFAULT_PROBE_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessSettings {
    /// Environment home; falls back to CFDEV_HOME, then ~/.cfdev
    pub home: Option<String>,
    pub control_program: String,
    pub control_args: Vec<String>,
    pub garden_host: String,
    pub bosh_host: String,
    pub router_host: String,
    pub patterns: Vec<String>,
    pub reap_verify_attempts: u32,
    pub reap_verify_interval_ms: u64,
    pub probe_request_timeout_ms: u64,
    pub stop_timeout_secs: u64,
}

impl HarnessSettings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(None)
    }

    /// `vars` replaces the process environment (tests)
    pub fn from_source(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let defaults = ReapPolicy::default();
        let patterns: Vec<String> = Component::ALL
            .iter()
            .map(|c| c.process_pattern().to_string())
            .collect();

        Config::builder()
            .set_default("control_program", DEFAULT_CONTROL_PROGRAM)?
            .set_default("control_args", vec!["dev".to_string()])?
            .set_default("garden_host", DEFAULT_GARDEN_HOST)?
            .set_default("bosh_host", DEFAULT_BOSH_HOST)?
            .set_default("router_host", DEFAULT_ROUTER_HOST)?
            .set_default("patterns", patterns)?
            .set_default("reap_verify_attempts", i64::from(defaults.verify_attempts))?
            .set_default(
                "reap_verify_interval_ms",
                defaults.verify_interval.as_millis() as i64,
            )?
            .set_default("probe_request_timeout_ms", DEFAULT_PROBE_REQUEST_TIMEOUT_MS as i64)?
            .set_default("stop_timeout_secs", DEFAULT_STOP_TIMEOUT_SECS as i64)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("control_args")
                    .with_list_parse_key("patterns")
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }

    pub fn home(&self) -> PathBuf {
        resolve_home(self.home.as_deref(), std::env::var("CFDEV_HOME").ok())
    }

    pub fn environment(&self) -> EnvironmentConfig {
        let mut env = EnvironmentConfig::new(self.home());
        env.garden_host = self.garden_host.clone();
        env.bosh_host = self.bosh_host.clone();
        env.router_host = self.router_host.clone();
        env.patterns = ProcessPatterns::new(self.patterns.iter().map(String::as_str));
        env
    }

    pub fn reap_policy(&self) -> ReapPolicy {
        ReapPolicy {
            verify_attempts: self.reap_verify_attempts,
            verify_interval: Duration::from_millis(self.reap_verify_interval_ms),
        }
    }

    pub fn probe_request_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_request_timeout_ms)
    }

    /// The tool runs against the same home the probes watch
    pub fn control_surface_config(&self, env: &EnvironmentConfig) -> ControlSurfaceConfig {
        let mut config =
            ControlSurfaceConfig::new(&self.control_program, self.control_args.clone());
        config
            .extra_env
            .insert("CFDEV_HOME".to_string(), env.home().display().to_string());
        config.stop_timeout = Duration::from_secs(self.stop_timeout_secs);
        config
    }
}

/// LIFECHECK_HOME, then CFDEV_HOME, then ~/.cfdev (tilde expanded)
pub fn resolve_home(configured: Option<&str>, cfdev_home: Option<String>) -> PathBuf {
    let raw = configured
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or(cfdev_home.filter(|h| !h.is_empty()))
        .unwrap_or_else(|| DEFAULT_HOME.to_string());
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
