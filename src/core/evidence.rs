//! Evidence Pack: the single aggregate one gate run produces.
//!
//! The pack is filled in by the check steps, then sealed in three moves that
//! must happen in this order:
//! 1. [`assign_proof_token`] hashes the canonical content (everything except
//!    `proof_token`, `proof_kernel`, `validation_result`) plus the timestamp.
//! 2. [`try_sign`] asks an optional signer for a signature; failure leaves
//!    `None`.
//! 3. [`EvidencePack::seal`] stores the verdict and kernel exactly once.
//!
//! Because the token exists before validation, failing packs still carry
//! one and can be correlated later.

use crate::core::error::ProofGateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

pub const PROOF_TOKEN_PREFIX: &str = "pg_";

/// Keys excluded from the canonical hash input.
const UNHASHED_KEYS: [&str; 3] = ["proof_token", "proof_kernel", "validation_result"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    pub is_admin: bool,
    pub is_owner: bool,
    pub is_client: bool,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAction {
    pub action: String,
    pub location: String,
    pub value: String,
}

impl HumanAction {
    pub fn new(action: &str, location: &str, value: &str) -> Self {
        Self {
            action: action.to_string(),
            location: location.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleCapture {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleCapture {
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

/// Outcome of one check. The orchestrator, not the step, decides whether a
/// `Fail` stops the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail(String),
    Skip(String),
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Pass => "pass",
            StepStatus::Fail(_) => "fail",
            StepStatus::Skip(_) => "skip",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            StepStatus::Pass => None,
            StepStatus::Fail(r) | StepStatus::Skip(r) => Some(r),
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, StepStatus::Fail(_))
    }
}

/// Timing and outcome of one step, as written to `runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub tool_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    /// False when the step itself errored or its failure aborted the run.
    pub ok: bool,
    pub error: Option<String>,
    /// `pass` / `fail` / `skip`, filled in once the orchestrator has mapped
    /// the step's result.
    pub status: Option<String>,
    pub detail: Option<String>,
    pub console: ConsoleCapture,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSnapshot {
    pub authenticated: bool,
    pub role: Option<String>,
    pub is_owner: bool,
    pub is_admin: bool,
    pub is_client: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsRealityCheck {
    pub checked: usize,
    pub ok: Vec<String>,
    pub missing: Vec<String>,
    pub all_imports_ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMeta {
    pub path: String,
    pub bytes: u64,
    pub line_count: usize,
    pub error_lines: usize,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub present: bool,
    pub text: String,
    pub meta: BuildMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimContradiction {
    pub claim_id: String,
    pub subject: String,
    pub claimed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorRunContradiction {
    pub run_id: String,
    pub build_sha256: String,
    pub prior_all_imports_ok: bool,
    pub current_all_imports_ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContradictionReport {
    pub detected: bool,
    pub claims: Vec<ClaimContradiction>,
    pub prior_run: Option<PriorRunContradiction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub code: String,
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub critical: usize,
    pub warning: usize,
    pub passed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNavAudit {
    pub summary: AuditSummary,
    pub findings: Vec<AuditFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSuspect {
    pub object: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub fix_sql: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbDoctorReport {
    pub ok: bool,
    pub suspect_count: usize,
    pub suspects: Vec<DbSuspect>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgePreflightReport {
    pub ok: bool,
    pub suspect_count: Option<u64>,
    pub report: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaAccessStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniQa {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeConsoleRun {
    pub function_name: String,
    pub created_at: Option<String>,
    pub error_count: u64,
    pub warning_count: u64,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    pub value: String,
    pub key_id: Option<String>,
}

/// The final verdict. Set once per pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub proof_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub tool_id: String,
    pub ok: bool,
    pub status: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofKernel {
    pub proof_token: String,
    pub content_sha256: String,
    /// Advisory only: `None` whenever the signer was absent or failed.
    pub signature: Option<Signature>,
    pub validator: ValidationResult,
    pub run_log: Vec<RunLogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub timestamp: String,
    pub current_route: String,
    pub user_id_masked: Option<String>,
    pub role_flags: RoleFlags,
    pub tenant_ids: Vec<String>,
    pub access_snapshot: Option<AccessSnapshot>,
    pub fs_reality_check: Option<FsRealityCheck>,
    pub build_output: Option<BuildOutput>,
    pub contradiction: Option<ContradictionReport>,
    pub route_nav_audit: Option<RouteNavAudit>,
    pub db_doctor: Option<DbDoctorReport>,
    pub edge_preflight: Option<EdgePreflightReport>,
    pub qa_access_status: Option<QaAccessStatus>,
    pub mini_qa: Option<MiniQa>,
    pub latest_edge_console_run: Option<EdgeConsoleRun>,
    pub recurring_issue_counts: BTreeMap<String, u64>,
    pub human_actions_required: Vec<HumanAction>,
    pub runs: Vec<StepRecord>,
    /// Step whose status stopped the sequence, if any.
    pub aborted_at: Option<String>,
    pub proof_token: Option<String>,
    pub proof_kernel: Option<ProofKernel>,
    pub validation_result: Option<ValidationResult>,
}

impl EvidencePack {
    pub fn new(timestamp: &str, current_route: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            current_route: current_route.to_string(),
            ..Self::default()
        }
    }

    pub fn push_action(&mut self, action: HumanAction) {
        if !self.human_actions_required.contains(&action) {
            self.human_actions_required.push(action);
        }
    }

    /// Record one occurrence of `code` in this run's counters.
    pub fn bump_issue(&mut self, code: &str) {
        *self
            .recurring_issue_counts
            .entry(code.to_string())
            .or_insert(0) += 1;
    }

    pub fn run_for(&self, tool_id: &str) -> Option<&StepRecord> {
        self.runs.iter().find(|r| r.tool_id == tool_id)
    }

    pub fn is_sealed(&self) -> bool {
        self.validation_result.is_some()
    }

    /// Store the verdict and kernel. Refuses a pack without a token and a
    /// pack that already has a verdict.
    pub fn seal(
        &mut self,
        verdict: ValidationResult,
        kernel: ProofKernel,
    ) -> Result<(), ProofGateError> {
        if self.is_sealed() {
            return Err(ProofGateError::ValidationError(
                "evidence pack already carries a verdict".to_string(),
            ));
        }
        match &self.proof_token {
            Some(token) if *token == verdict.proof_token && *token == kernel.proof_token => {}
            Some(_) => {
                return Err(ProofGateError::ValidationError(
                    "verdict token does not match pack token".to_string(),
                ));
            }
            None => {
                return Err(ProofGateError::ValidationError(
                    "cannot seal a pack before its proof token is assigned".to_string(),
                ));
            }
        }
        self.validation_result = Some(verdict);
        self.proof_kernel = Some(kernel);
        Ok(())
    }

    pub fn run_log(&self) -> Vec<RunLogEntry> {
        self.runs
            .iter()
            .map(|r| RunLogEntry {
                tool_id: r.tool_id.clone(),
                ok: r.ok,
                status: r.status.clone(),
                duration_ms: r.duration_ms,
            })
            .collect()
    }
}

/// Compact JSON of the pack with token, kernel, and verdict removed.
/// Object keys come out sorted, so equal packs yield equal bytes.
pub fn canonical_content(pack: &EvidencePack) -> Result<Vec<u8>, ProofGateError> {
    let mut value = serde_json::to_value(pack)?;
    if let Some(obj) = value.as_object_mut() {
        for key in UNHASHED_KEYS {
            obj.remove(key);
        }
    }
    Ok(serde_json::to_vec(&sort_keys(value))?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn content_sha256(pack: &EvidencePack) -> Result<String, ProofGateError> {
    Ok(sha256_hex(&canonical_content(pack)?))
}

/// `pg_<sha256(canonical ‖ "\n" ‖ timestamp)>`. Pure: same pack, same token.
pub fn compute_proof_token(pack: &EvidencePack) -> Result<String, ProofGateError> {
    let mut input = canonical_content(pack)?;
    input.push(b'\n');
    input.extend_from_slice(pack.timestamp.as_bytes());
    Ok(format!("{}{}", PROOF_TOKEN_PREFIX, sha256_hex(&input)))
}

/// Compute and store the token. Only once per pack.
pub fn assign_proof_token(pack: &mut EvidencePack) -> Result<String, ProofGateError> {
    if let Some(existing) = &pack.proof_token {
        return Err(ProofGateError::ValidationError(format!(
            "proof token already assigned: {}",
            existing
        )));
    }
    let token = compute_proof_token(pack)?;
    pack.proof_token = Some(token.clone());
    Ok(token)
}

/// Anything that can countersign a proof token.
pub trait PackSigner {
    fn sign(&self, proof_token: &str, content_sha256: &str) -> Result<Signature, ProofGateError>;
}

/// Best-effort signing: every failure becomes `None`.
pub fn try_sign(
    signer: Option<&dyn PackSigner>,
    proof_token: &str,
    content_sha256: &str,
) -> Option<Signature> {
    let signer = signer?;
    match signer.sign(proof_token, content_sha256) {
        Ok(sig) if !sig.value.is_empty() => Some(sig),
        Ok(_) => {
            warn!(proof_token, "signer returned an empty signature");
            None
        }
        Err(e) => {
            warn!(proof_token, error = %e, "pack signing failed; continuing unsigned");
            None
        }
    }
}
