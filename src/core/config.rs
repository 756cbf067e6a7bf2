//! Project configuration loaded from `.proofgate/config.toml`.
//!
//! Every field has a default, so a missing file is not an error. A handful of
//! environment variables override the file (backend URL, service key, bind
//! address) so secrets never need to live in the repository.

use crate::core::error::ProofGateError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_DIR: &str = ".proofgate";
pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_BACKEND_URL: &str = "PROOFGATE_BACKEND_URL";
pub const ENV_BIND: &str = "PROOFGATE_BIND";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProofGateConfig {
    pub backend: BackendConfig,
    pub gate: GateSettings,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (REST + functions).
    pub url: Option<String>,
    /// Name of the environment variable holding the service key.
    pub service_key_env: String,
    /// Resolved from `service_key_env` at load time; never read from the file.
    #[serde(skip)]
    pub service_key: Option<String>,
    pub timeout_ms: u64,
    pub preflight_endpoint: String,
    pub sign_endpoint: String,
    /// Full URL of the scheduler the admin proxy forwards to.
    /// Defaults to `<url>/functions/v1/run-scheduler`.
    pub scheduler_url: Option<String>,
    /// Function whose console runs the gate captures.
    pub console_function: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key_env: "PROOFGATE_SERVICE_KEY".to_string(),
            service_key: None,
            timeout_ms: 10_000,
            preflight_endpoint: "edge-preflight".to_string(),
            sign_endpoint: "proof-sign".to_string(),
            scheduler_url: None,
            console_function: "lead-webhook".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resolved_scheduler_url(&self) -> Option<String> {
        self.scheduler_url.clone().or_else(|| {
            self.url
                .as_ref()
                .map(|u| format!("{}/functions/v1/run-scheduler", u.trim_end_matches('/')))
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateSettings {
    /// Module paths (relative to the project root) that must exist.
    pub import_paths: Vec<String>,
    /// Captured build output, relative to the project root.
    pub build_log: String,
    /// Route registry, relative to the project root.
    pub routes_file: String,
    pub tenant_sample: usize,
    /// Recurring issues at or above this count surface as mini-QA warnings.
    pub recurring_threshold: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            import_paths: Vec::new(),
            build_log: ".proofgate/build-output.txt".to_string(),
            routes_file: ".proofgate/routes.toml".to_string(),
            tenant_sample: 5,
            recurring_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Parse a config document, without environment overrides.
pub fn parse_config(content: &str) -> Result<ProofGateConfig, ProofGateError> {
    Ok(toml::from_str(content)?)
}

/// Load `.proofgate/config.toml` under `project_root` and apply environment
/// overrides. A missing file yields the defaults.
pub fn load_config(project_root: &Path) -> Result<ProofGateConfig, ProofGateError> {
    let config_path = project_root.join(CONFIG_DIR).join(CONFIG_FILE);
    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(ProofGateError::IoError)?;
        parse_config(&content)?
    } else {
        ProofGateConfig::default()
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

impl ProofGateConfig {
    /// Apply overrides from any key lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup(&self.backend.service_key_env).filter(|v| !v.is_empty()) {
            self.backend.service_key = Some(key);
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind;
        }
    }
}
