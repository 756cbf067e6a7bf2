//! Proof Gate orchestrator.
//!
//! Runs a [`GatePlan`] strictly in order against one [`GateContext`], then
//! seals the resulting pack: token, best-effort signature, verdict, kernel.
//! Whether a failing step stops the sequence is decided here, from the plan
//! entry's [`OnFail`] policy, and never inside a step.

use crate::core::backend::Backend;
use crate::core::config::ProofGateConfig;
use crate::core::error::ProofGateError;
use crate::core::evidence::{
    self, EvidencePack, PackSigner, ProofKernel, Signature, StepStatus,
};
use crate::core::history::RunHistory;
use crate::core::identity::RoleContext;
use crate::core::issues::{self, IssueLedger};
use crate::core::recorder::{GateContext, GateEnv, GateStep, run_with_proof};
use crate::core::time;
use crate::core::validate::{self, ValidationReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFail {
    Continue,
    Abort,
}

/// How a step that returned `Err` is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Fail,
    Skip,
}

pub struct PlanEntry {
    pub step: Box<dyn GateStep>,
    pub on_fail: OnFail,
    pub on_error: OnError,
}

#[derive(Default)]
pub struct GatePlan {
    entries: Vec<PlanEntry>,
}

impl GatePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl GateStep + 'static, on_fail: OnFail, on_error: OnError) -> Self {
        self.entries.push(PlanEntry {
            step: Box::new(step),
            on_fail,
            on_error,
        });
        self
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.step.id()).collect()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }
}

/// A sealed pack plus the full validator report. Read-only by construction.
#[derive(Debug, Clone)]
pub struct FinalizedPack {
    run_id: String,
    pack: EvidencePack,
    report: ValidationReport,
}

impl FinalizedPack {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pack(&self) -> &EvidencePack {
        &self.pack
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn is_ok(&self) -> bool {
        self.report.ok
    }

    pub fn proof_token(&self) -> &str {
        self.pack.proof_token.as_deref().unwrap_or_default()
    }

    pub fn into_pack(self) -> EvidencePack {
        self.pack
    }
}

#[derive(Debug, Serialize)]
struct GateEvent<'a> {
    ts: String,
    event_id: String,
    run_id: &'a str,
    route: &'a str,
    proof_token: &'a str,
    ok: bool,
    signed: bool,
    aborted_at: Option<&'a str>,
    errors: usize,
    warnings: usize,
    steps: Vec<String>,
}

pub struct ProofGate<'a> {
    project_root: &'a Path,
    config: &'a ProofGateConfig,
    backend: &'a dyn Backend,
    ledger: &'a dyn IssueLedger,
    history: &'a dyn RunHistory,
    signer: Option<&'a dyn PackSigner>,
    event_log: Option<PathBuf>,
    plan: GatePlan,
}

impl<'a> ProofGate<'a> {
    pub fn new(
        project_root: &'a Path,
        config: &'a ProofGateConfig,
        backend: &'a dyn Backend,
        ledger: &'a dyn IssueLedger,
        history: &'a dyn RunHistory,
        plan: GatePlan,
    ) -> Self {
        Self {
            project_root,
            config,
            backend,
            ledger,
            history,
            signer: None,
            event_log: None,
            plan,
        }
    }

    pub fn with_signer(mut self, signer: &'a dyn PackSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Append one line per run to `path` (normally `gate.events.jsonl`).
    pub fn with_event_log(mut self, path: PathBuf) -> Self {
        self.event_log = Some(path);
        self
    }

    pub fn run(&self, role: &RoleContext, route: &str) -> Result<FinalizedPack, ProofGateError> {
        self.run_at(role, route, Utc::now())
    }

    pub fn run_at(
        &self,
        role: &RoleContext,
        route: &str,
        at: DateTime<Utc>,
    ) -> Result<FinalizedPack, ProofGateError> {
        let baseline = self.ledger.load()?;
        let mut pack = EvidencePack::new(&time::rfc3339_millis(&at), route);
        pack.recurring_issue_counts = baseline.clone();

        let env = GateEnv {
            project_root: self.project_root,
            settings: &self.config.gate,
            backend_config: &self.config.backend,
            backend: self.backend,
            history: self.history,
            role,
        };
        let mut ctx = GateContext::new(env, pack);
        self.run_plan(&mut ctx);
        let mut pack = ctx.into_pack();

        let token = evidence::assign_proof_token(&mut pack)?;
        let content_sha256 = evidence::content_sha256(&pack)?;
        let signature = evidence::try_sign(self.signer, &token, &content_sha256);
        let report = validate::validate_with_signature(&pack, signature.as_ref());

        let verdict = report.to_result();
        let kernel = ProofKernel {
            proof_token: token.clone(),
            content_sha256,
            signature,
            validator: verdict.clone(),
            run_log: pack.run_log(),
        };
        pack.seal(verdict, kernel)?;

        let new_counts = issues::deltas(&baseline, &pack.recurring_issue_counts);
        self.ledger.increment(&new_counts)?;
        let run_id = self.history.record_run(&pack)?;

        info!(
            run_id = %run_id,
            proof_token = %token,
            ok = report.ok,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "proof gate sealed"
        );

        if let Some(path) = &self.event_log {
            let event = GateEvent {
                ts: time::now_epoch_z(),
                event_id: time::new_event_id(),
                run_id: &run_id,
                route,
                proof_token: &token,
                ok: report.ok,
                signed: pack
                    .proof_kernel
                    .as_ref()
                    .is_some_and(|k| k.signature.is_some()),
                aborted_at: pack.aborted_at.as_deref(),
                errors: report.errors.len(),
                warnings: report.warnings.len(),
                steps: pack
                    .runs
                    .iter()
                    .map(|r| {
                        format!(
                            "{}:{}",
                            r.tool_id,
                            r.status.as_deref().unwrap_or("unknown")
                        )
                    })
                    .collect(),
            };
            time::append_jsonl(path, &event)?;
        }

        Ok(FinalizedPack {
            run_id,
            pack,
            report,
        })
    }

    fn run_plan(&self, ctx: &mut GateContext<'_>) {
        for entry in self.plan.entries() {
            let id = entry.step.id();
            let status = match run_with_proof(ctx, id, |c| entry.step.run(c)) {
                Ok(status) => status,
                Err(e) => match entry.on_error {
                    OnError::Fail => StepStatus::Fail(e.to_string()),
                    OnError::Skip => StepStatus::Skip(e.to_string()),
                },
            };
            ctx.annotate_last(&status);
            info!(step = id, status = status.label(), "gate step");

            if status.is_fail() && entry.on_fail == OnFail::Abort {
                warn!(step = id, reason = status.reason().unwrap_or(""), "gate sequence aborted");
                if let Some(last) = ctx.pack.runs.last_mut() {
                    last.ok = false;
                    last.error = status.reason().map(str::to_string);
                }
                ctx.pack.aborted_at = Some(id.to_string());
                break;
            }
        }
    }
}

/// Signs through a backend function that answers
/// `{signature, algorithm, key_id}`.
pub struct RemoteSigner<'a> {
    backend: &'a dyn Backend,
    endpoint: String,
}

impl<'a> RemoteSigner<'a> {
    pub fn new(backend: &'a dyn Backend, endpoint: &str) -> Self {
        Self {
            backend,
            endpoint: endpoint.to_string(),
        }
    }
}

impl PackSigner for RemoteSigner<'_> {
    fn sign(&self, proof_token: &str, content_sha256: &str) -> Result<Signature, ProofGateError> {
        let resp = self.backend.invoke_function(
            &self.endpoint,
            &json!({ "proof_token": proof_token, "content_sha256": content_sha256 }),
        )?;
        let value = resp
            .get("signature")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProofGateError::ValidationError("signer response has no signature".to_string())
            })?;
        Ok(Signature {
            algorithm: resp
                .get("algorithm")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            value: value.to_string(),
            key_id: resp
                .get("key_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}
