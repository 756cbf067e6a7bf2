//! HTTP surface for the lead webhook and the admin scheduler proxy.
//!
//! Handlers are synchronous (rusqlite, blocking HTTP), so every request is
//! moved onto the blocking pool.

use crate::core::config::{BackendConfig, ProofGateConfig};
use crate::core::error::ProofGateError;
use crate::core::store::Store;
use crate::plugins::scheduler::{HttpScheduler, SchedulerClient, handle_admin_run_scheduler};
use crate::plugins::tenancy::TenancyStore;
use crate::plugins::webhook::{
    HEADER_API_KEY, HEADER_TENANT_ID, HandlerResponse, TenantCredentials, handle_lead_webhook,
};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

pub const LEAD_WEBHOOK_PATH: &str = "/functions/v1/lead-webhook";
pub const ADMIN_SCHEDULER_PATH: &str = "/functions/v1/admin-run-scheduler";

/// Stands in when no scheduler endpoint is configured; every trigger fails.
struct NoScheduler;

impl SchedulerClient for NoScheduler {
    fn trigger(&self, _payload: &Value) -> Result<Value, ProofGateError> {
        Err(ProofGateError::ConfigError(
            "no scheduler endpoint configured".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct AppState {
    store: Store,
    scheduler: Arc<dyn SchedulerClient + Send + Sync>,
}

impl AppState {
    pub fn new(store: Store, scheduler: Arc<dyn SchedulerClient + Send + Sync>) -> Self {
        Self { store, scheduler }
    }

    pub fn from_config(store: Store, config: &BackendConfig) -> Self {
        let scheduler: Arc<dyn SchedulerClient + Send + Sync> =
            match HttpScheduler::from_config(config) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    info!(reason = %e, "admin scheduler proxy has no upstream");
                    Arc::new(NoScheduler)
                }
            };
        Self::new(store, scheduler)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(LEAD_WEBHOOK_PATH, post(lead_webhook))
        .route(ADMIN_SCHEDULER_PATH, post(admin_run_scheduler))
        .with_state(state)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn into_reply(
    outcome: Result<Result<HandlerResponse, ProofGateError>, tokio::task::JoinError>,
) -> (StatusCode, Json<Value>) {
    let resp = match outcome {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            error!(error = %e, "handler failed");
            HandlerResponse::error(500, "internal error")
        }
        Err(e) => {
            error!(error = %e, "handler task aborted");
            HandlerResponse::error(500, "internal error")
        }
    };
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") }))
}

async fn lead_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let creds = TenantCredentials {
        tenant_id: header_value(&headers, HEADER_TENANT_ID),
        api_key: header_value(&headers, HEADER_API_KEY),
    };
    let received = Utc::now();
    let outcome = tokio::task::spawn_blocking(move || {
        handle_lead_webhook(&state.store, &creds, &body, received)
    })
    .await;
    into_reply(outcome)
}

async fn admin_run_scheduler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let authorization = header_value(&headers, header::AUTHORIZATION.as_str());
    let outcome = tokio::task::spawn_blocking(move || {
        let tenancy = TenancyStore::new(&state.store);
        handle_admin_run_scheduler(
            &tenancy,
            state.scheduler.as_ref(),
            authorization.as_deref(),
            &body,
        )
    })
    .await;
    into_reply(outcome)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Serve until Ctrl-C.
pub async fn serve(store: Store, config: &ProofGateConfig) -> Result<(), ProofGateError> {
    let addr: SocketAddr = config.server.bind.parse().map_err(|e| {
        ProofGateError::ConfigError(format!("invalid bind address {}: {}", config.server.bind, e))
    })?;
    let app = router(AppState::from_config(store, &config.backend));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "proofgate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
