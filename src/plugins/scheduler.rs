//! Admin scheduler proxy.
//!
//! Authenticates a bearer token, requires an `admin` role row, and forwards
//! `{action, tenant_ids?}` to the external scheduler endpoint. The scheduler
//! itself lives elsewhere; this is only the gate in front of it.

use crate::core::config::BackendConfig;
use crate::core::error::ProofGateError;
use crate::core::identity::RoleContext;
use crate::plugins::tenancy::TenancyStore;
use crate::plugins::webhook::HandlerResponse;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{info, warn};

/// Maps a bearer token to the caller. `Ok(None)` means the token is unknown.
pub trait TokenVerifier {
    fn verify(&self, token: &str) -> Result<Option<RoleContext>, ProofGateError>;
}

impl TokenVerifier for TenancyStore {
    fn verify(&self, token: &str) -> Result<Option<RoleContext>, ProofGateError> {
        self.resolve_token(token)
    }
}

pub trait SchedulerClient {
    fn trigger(&self, payload: &Value) -> Result<Value, ProofGateError>;
}

pub struct HttpScheduler {
    agent: ureq::Agent,
    url: String,
    service_key: Option<String>,
}

impl HttpScheduler {
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProofGateError> {
        let url = config.resolved_scheduler_url().ok_or_else(|| {
            ProofGateError::ConfigError(
                "no scheduler endpoint: set backend.scheduler_url or backend.url".to_string(),
            )
        })?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(config.timeout()).build(),
            url,
            service_key: config.service_key.clone(),
        })
    }
}

impl SchedulerClient for HttpScheduler {
    fn trigger(&self, payload: &Value) -> Result<Value, ProofGateError> {
        let mut req = self.agent.post(&self.url).set("Content-Type", "application/json");
        if let Some(key) = &self.service_key {
            req = req.set("Authorization", &format!("Bearer {}", key));
        }
        let text = req
            .send_json(payload.clone())?
            .into_string()
            .map_err(ProofGateError::IoError)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Non-JSON answers are passed through as a string.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// `Bearer <token>` with a case-insensitive scheme and a non-empty token.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn parse_request(raw_body: &str) -> Result<Value, &'static str> {
    let body: Value = serde_json::from_str(raw_body).map_err(|_| "body must be JSON")?;
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or("action is required")?;
    let mut forward = json!({ "action": action });
    match body.get("tenant_ids") {
        None | Some(Value::Null) => {}
        Some(Value::Array(ids)) if ids.iter().all(Value::is_string) => {
            forward["tenant_ids"] = Value::Array(ids.clone());
        }
        Some(_) => return Err("tenant_ids must be an array of strings"),
    }
    Ok(forward)
}

pub fn handle_admin_run_scheduler(
    verifier: &dyn TokenVerifier,
    scheduler: &dyn SchedulerClient,
    authorization: Option<&str>,
    raw_body: &str,
) -> Result<HandlerResponse, ProofGateError> {
    let Some(token) = bearer_token(authorization) else {
        return Ok(HandlerResponse::error(401, "missing or malformed bearer token"));
    };
    let Some(caller) = verifier.verify(token)? else {
        return Ok(HandlerResponse::error(401, "invalid token"));
    };
    let user_id = caller.user_id.clone().unwrap_or_default();
    if !caller.is_admin() {
        warn!(user_id = %user_id, "non-admin scheduler request");
        return Ok(HandlerResponse::error(403, "admin role required"));
    }

    let forward = match parse_request(raw_body) {
        Ok(f) => f,
        Err(msg) => return Ok(HandlerResponse::error(400, msg)),
    };
    let action = forward["action"].clone();

    let started = Instant::now();
    let outcome = scheduler.trigger(&forward);
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    Ok(match outcome {
        Ok(result) => {
            info!(user_id = %user_id, action = %action, duration_ms, "scheduler triggered");
            HandlerResponse::new(
                200,
                json!({
                    "success": true,
                    "action": action,
                    "result": result,
                    "triggered_by": user_id,
                    "duration_ms": duration_ms
                }),
            )
        }
        Err(e) => {
            warn!(user_id = %user_id, action = %action, error = %e, "scheduler call failed");
            HandlerResponse::new(502, json!({ "success": false, "error": e.to_string() }))
        }
    })
}
