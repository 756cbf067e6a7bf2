//! Support bundle: one JSON document with everything needed to triage a
//! report without access to the machine.

use crate::core::config::ProofGateConfig;
use crate::core::error::ProofGateError;
use crate::core::evidence::EvidencePack;
use crate::core::history::{PriorRun, SqliteRunHistory};
use crate::core::issues::{IssueRow, SqliteIssueLedger};
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::webhook::{self, WebhookEvent};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;

const RECENT_RUNS: usize = 10;
const RECENT_EVENTS: usize = 25;

#[derive(Debug, Serialize)]
pub struct SupportBundle {
    pub generated_at: String,
    pub version: String,
    /// Secrets are never included; only whether one is set.
    pub config: Value,
    pub latest_pack: Option<EvidencePack>,
    pub recent_runs: Vec<PriorRun>,
    pub recurring_issues: Vec<IssueRow>,
    pub recent_webhook_events: Vec<WebhookEvent>,
}

fn redacted_config(config: &ProofGateConfig) -> Value {
    json!({
        "backend": {
            "url": config.backend.url,
            "service_key_set": config.backend.service_key.is_some(),
            "timeout_ms": config.backend.timeout_ms,
            "preflight_endpoint": config.backend.preflight_endpoint,
            "sign_endpoint": config.backend.sign_endpoint,
            "console_function": config.backend.console_function,
        },
        "gate": config.gate,
        "server": config.server,
    })
}

pub fn build_bundle(store: &Store, config: &ProofGateConfig) -> Result<SupportBundle, ProofGateError> {
    let history = SqliteRunHistory::new(store);
    Ok(SupportBundle {
        generated_at: time::rfc3339_millis(&Utc::now()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config: redacted_config(config),
        latest_pack: history.latest_pack()?,
        recent_runs: history.recent_runs(RECENT_RUNS)?,
        recurring_issues: SqliteIssueLedger::new(store).rows()?,
        recent_webhook_events: webhook::recent_events(store, RECENT_EVENTS)?,
    })
}

/// Pretty JSON to `out`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<(), ProofGateError> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, format!("{}\n", text))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", text)?;
        }
    }
    Ok(())
}
