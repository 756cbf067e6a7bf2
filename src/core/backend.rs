//! Remote backend seam.
//!
//! The hosted backend exposes three shapes of call: PostgREST-style table
//! reads, RPC procedures, and serverless functions. Checks only ever see the
//! [`Backend`] trait so tests can substitute canned responses.

use crate::core::config::BackendConfig;
use crate::core::error::ProofGateError;
use serde_json::Value;
use tracing::debug;

pub trait Backend {
    /// `POST /rest/v1/rpc/<procedure>`
    fn rpc(&self, procedure: &str, args: &Value) -> Result<Value, ProofGateError>;

    /// `POST /functions/v1/<name>`
    fn invoke_function(&self, name: &str, body: &Value) -> Result<Value, ProofGateError>;

    /// `GET /rest/v1/<table>?<query>`; always an array of rows.
    fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, ProofGateError>;
}

/// Blocking HTTP implementation over `ureq`.
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
    service_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, service_key: Option<String>, config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }

    /// Build from config; errors when no backend URL is configured.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProofGateError> {
        let url = config.url.as_deref().ok_or_else(|| {
            ProofGateError::ConfigError(
                "backend.url is not set (config.toml or PROOFGATE_BACKEND_URL)".to_string(),
            )
        })?;
        Ok(Self::new(url, config.service_key.clone(), config))
    }

    fn authorize(&self, req: ureq::Request) -> ureq::Request {
        match &self.service_key {
            Some(key) => req
                .set("apikey", key)
                .set("Authorization", &format!("Bearer {}", key)),
            None => req,
        }
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value, ProofGateError> {
        debug!(url, "backend POST");
        let resp = self
            .authorize(self.agent.post(url))
            .set("Content-Type", "application/json")
            .send_json(body.clone())?;
        read_json(resp)
    }
}

fn read_json(resp: ureq::Response) -> Result<Value, ProofGateError> {
    let text = resp.into_string().map_err(ProofGateError::IoError)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

impl Backend for HttpBackend {
    fn rpc(&self, procedure: &str, args: &Value) -> Result<Value, ProofGateError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, procedure);
        self.post(&url, args)
    }

    fn invoke_function(&self, name: &str, body: &Value) -> Result<Value, ProofGateError> {
        let url = format!("{}/functions/v1/{}", self.base_url, name);
        self.post(&url, body)
    }

    fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, ProofGateError> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        debug!(url, "backend GET");
        let mut req = self.authorize(self.agent.get(&url));
        for (k, v) in query {
            req = req.query(k, v);
        }
        match read_json(req.call()?)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(ProofGateError::ValidationError(format!(
                "expected array from {}, got {}",
                table, other
            ))),
        }
    }
}

/// Backend used when no URL is configured: every call fails as a transport
/// error, so step policies (skip/fail) apply exactly as for an outage.
pub struct UnconfiguredBackend;

impl Backend for UnconfiguredBackend {
    fn rpc(&self, procedure: &str, _args: &Value) -> Result<Value, ProofGateError> {
        Err(unconfigured(procedure))
    }

    fn invoke_function(&self, name: &str, _body: &Value) -> Result<Value, ProofGateError> {
        Err(unconfigured(name))
    }

    fn select(&self, table: &str, _query: &[(&str, String)]) -> Result<Vec<Value>, ProofGateError> {
        Err(unconfigured(table))
    }
}

fn unconfigured(target: &str) -> ProofGateError {
    ProofGateError::TransportError(format!("no backend configured (wanted {})", target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_url() {
        let config = BackendConfig::default();
        assert!(matches!(
            HttpBackend::from_config(&config),
            Err(ProofGateError::ConfigError(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = BackendConfig::default();
        let backend = HttpBackend::new("https://x.test/", None, &config);
        assert_eq!(backend.base_url, "https://x.test");
    }

    #[test]
    fn unconfigured_backend_fails_as_transport() {
        let err = UnconfiguredBackend
            .rpc("qa_dependency_check", &Value::Null)
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let config = BackendConfig {
            timeout_ms: 200,
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new("http://127.0.0.1:9", None, &config);
        let err = backend
            .invoke_function("edge-preflight", &serde_json::json!({"mode": "preflight"}))
            .unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
    }
}
