//! Step Recorder and the per-run context steps operate on.
//!
//! [`run_with_proof`] is the only place a [`StepRecord`] is created. It does
//! not swallow anything: whatever the wrapped closure returns is handed back
//! after the record is appended, and the caller decides what a failure means.

use crate::core::backend::Backend;
use crate::core::config::{BackendConfig, GateSettings};
use crate::core::error::ProofGateError;
use crate::core::evidence::{ConsoleCapture, EvidencePack, StepRecord, StepStatus};
use crate::core::history::RunHistory;
use crate::core::identity::RoleContext;
use crate::core::time;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Read-only collaborators shared by every step of one run.
pub struct GateEnv<'a> {
    pub project_root: &'a Path,
    pub settings: &'a GateSettings,
    pub backend_config: &'a BackendConfig,
    pub backend: &'a dyn Backend,
    pub history: &'a dyn RunHistory,
    pub role: &'a RoleContext,
}

/// Mutable state threaded through the steps: the pack under construction and
/// the console output of the step currently running.
pub struct GateContext<'a> {
    pub env: GateEnv<'a>,
    pub pack: EvidencePack,
    console: ConsoleCapture,
}

impl<'a> GateContext<'a> {
    pub fn new(env: GateEnv<'a>, pack: EvidencePack) -> Self {
        Self {
            env,
            pack,
            console: ConsoleCapture::default(),
        }
    }

    pub fn console_warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "proofgate::step", "{}", message);
        self.console.warnings.push(message);
    }

    pub fn console_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "proofgate::step", "{}", message);
        self.console.errors.push(message);
    }

    /// Attach the orchestrator's mapped status to the most recent record.
    pub fn annotate_last(&mut self, status: &StepStatus) {
        if let Some(last) = self.pack.runs.last_mut() {
            last.status = Some(status.label().to_string());
            last.detail = status.reason().map(str::to_string);
        }
    }

    pub fn into_pack(self) -> EvidencePack {
        self.pack
    }
}

/// One diagnostic check.
pub trait GateStep {
    fn id(&self) -> &'static str;
    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError>;
}

/// Time `f`, capture its console output and outcome into `ctx.pack.runs`, and
/// return its result unchanged.
pub fn run_with_proof<'a, T, F>(
    ctx: &mut GateContext<'a>,
    step_id: &str,
    f: F,
) -> Result<T, ProofGateError>
where
    F: FnOnce(&mut GateContext<'a>) -> Result<T, ProofGateError>,
{
    ctx.console = ConsoleCapture::default();
    let started_at = time::rfc3339_millis(&Utc::now());
    let clock = Instant::now();

    let result = f(ctx);

    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    let ended_at = time::rfc3339_millis(&Utc::now());
    let (ok, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    debug!(step = step_id, ok, duration_ms, "step finished");

    ctx.pack.runs.push(StepRecord {
        tool_id: step_id.to_string(),
        started_at,
        ended_at,
        duration_ms,
        ok,
        error,
        status: None,
        detail: None,
        console: std::mem::take(&mut ctx.console),
    });
    result
}
