//! Strict Validator for evidence packs.
//!
//! A fixed rule set applied to a pack, with no I/O. Required rules append to
//! `errors` and block the pass; advisory rules append to `warnings` and never
//! do. `ok` is exactly `errors.is_empty()`.
//!
//! Required:
//! - timestamp present
//! - proof token assigned
//! - build output present
//! - filesystem reality check reports every import ok
//! - route/nav audit has zero critical findings
//! - no contradiction detected
//!
//! Advisory: signature, build error lines, early abort, DB doctor, edge preflight, mini-QA,
//! route warnings, edge console errors, and any other failed step.

use crate::core::error::ProofGateError;
use crate::core::evidence::{self, EvidencePack, HumanAction, Signature, ValidationResult};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub required_actions: Vec<HumanAction>,
    pub proof_token: Option<String>,
}

impl ValidationReport {
    pub fn to_result(&self) -> ValidationResult {
        ValidationResult {
            ok: self.ok,
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            proof_token: self.proof_token.clone().unwrap_or_default(),
        }
    }
}

/// Steps whose failures already map to a dedicated rule above.
const STEPS_WITH_RULES: [&str; 8] = [
    "fs_reality",
    "build_output",
    "contradiction",
    "route_audit",
    "db_doctor",
    "edge_preflight",
    "mini_qa",
    "edge_console",
];

/// Validate a pack using the signature recorded in its kernel, if any.
pub fn validate(pack: &EvidencePack) -> ValidationReport {
    let signature = pack
        .proof_kernel
        .as_ref()
        .and_then(|k| k.signature.as_ref());
    validate_with_signature(pack, signature)
}

/// Validate a pack read back from disk or history. On top of the rule set,
/// the stored token and content hash must still match the pack's content.
pub fn validate_stored(pack: &EvidencePack) -> Result<ValidationReport, ProofGateError> {
    let mut report = validate(pack);
    let mut tampered = Vec::new();
    if let Some(stored) = pack.proof_token.as_deref()
        && evidence::compute_proof_token(pack)? != stored
    {
        tampered.push("proof token does not match pack content".to_string());
    }
    match &pack.proof_kernel {
        Some(kernel) => {
            if pack.proof_token.as_deref() != Some(kernel.proof_token.as_str()) {
                tampered.push("proof kernel token does not match pack token".to_string());
            }
            if evidence::content_sha256(pack)? != kernel.content_sha256 {
                tampered.push("content hash does not match pack content".to_string());
            }
        }
        None => tampered.push("pack was never sealed".to_string()),
    }
    if !tampered.is_empty() {
        let action = HumanAction::new("Re-run the proof gate", "proof_kernel", "");
        if !report.required_actions.contains(&action) {
            report.required_actions.push(action);
        }
        report.errors.extend(tampered);
        report.ok = false;
    }
    Ok(report)
}

/// Validate a pack that has not been sealed yet; `signature` is whatever the
/// signer produced for it.
pub fn validate_with_signature(
    pack: &EvidencePack,
    signature: Option<&Signature>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut required_actions = pack.human_actions_required.clone();

    let mut require = |cond: bool, message: String, action: HumanAction| {
        if !cond {
            errors.push(message);
            if !required_actions.contains(&action) {
                required_actions.push(action);
            }
        }
    };

    require(
        !pack.timestamp.trim().is_empty(),
        "pack timestamp is missing".to_string(),
        HumanAction::new("Re-run the proof gate", "timestamp", ""),
    );
    require(
        pack.proof_token.as_deref().is_some_and(|t| !t.is_empty()),
        "proof token was not computed before validation".to_string(),
        HumanAction::new("Re-run the proof gate", "proof_token", ""),
    );

    let build_present = pack.build_output.as_ref().is_some_and(|b| b.present);
    require(
        build_present,
        "build output is missing".to_string(),
        HumanAction::new("Run the build and capture output", "build_output", ""),
    );
    if let Some(build) = pack.build_output.as_ref().filter(|b| b.present)
        && build.meta.error_lines > 0
    {
        warnings.push(format!(
            "build output has {} error line(s)",
            build.meta.error_lines
        ));
    }

    match &pack.fs_reality_check {
        Some(fs) => require(
            fs.all_imports_ok,
            format!(
                "filesystem reality check: {} missing import(s): {}",
                fs.missing.len(),
                fs.missing.join(", ")
            ),
            HumanAction::new("Restore missing modules", "fs_reality_check", ""),
        ),
        None => require(
            false,
            "filesystem reality check did not run".to_string(),
            HumanAction::new("Re-run the proof gate", "fs_reality_check", ""),
        ),
    }

    match &pack.route_nav_audit {
        Some(audit) => {
            require(
                audit.summary.critical == 0,
                format!(
                    "route/nav audit: {} critical finding(s)",
                    audit.summary.critical
                ),
                HumanAction::new("Fix critical route findings", "route_nav_audit", ""),
            );
            if audit.summary.warning > 0 {
                warnings.push(format!(
                    "route/nav audit: {} warning(s)",
                    audit.summary.warning
                ));
            }
        }
        None => require(
            false,
            "route/nav audit did not run".to_string(),
            HumanAction::new("Re-run the proof gate", "route_nav_audit", ""),
        ),
    }

    if let Some(c) = &pack.contradiction {
        require(
            !c.detected,
            format!(
                "contradiction detected ({} claim(s){})",
                c.claims.len(),
                if c.prior_run.is_some() {
                    ", prior run mismatch"
                } else {
                    ""
                }
            ),
            HumanAction::new(
                "Resolve contradiction between claims and filesystem",
                "contradiction",
                "",
            ),
        );
    }

    // Advisory rules.
    if signature.is_none() {
        warnings.push("evidence pack is unsigned".to_string());
    }
    if let Some(step) = &pack.aborted_at {
        warnings.push(format!("sequence aborted at step '{}'", step));
    }
    match &pack.db_doctor {
        Some(doc) if !doc.ok => warnings.push(format!(
            "db doctor reported {} suspect object(s)",
            doc.suspect_count
        )),
        None if pack.aborted_at.is_none() => {
            warnings.push("db doctor skipped".to_string());
        }
        _ => {}
    }
    if let Some(pre) = &pack.edge_preflight
        && !pre.ok
    {
        warnings.push("edge preflight reported not ok".to_string());
    } else if pack.edge_preflight.is_none() && step_failed(pack, "edge_preflight") {
        warnings.push("edge preflight unreachable".to_string());
    }
    if let Some(qa) = &pack.mini_qa {
        warnings.extend(qa.errors.iter().map(|e| format!("mini-qa error: {}", e)));
        warnings.extend(qa.warnings.iter().map(|w| format!("mini-qa: {}", w)));
    }
    if let Some(run) = &pack.latest_edge_console_run
        && run.error_count > 0
    {
        warnings.push(format!(
            "edge console: {} error(s) in latest {} run",
            run.error_count, run.function_name
        ));
    }
    for rec in &pack.runs {
        if STEPS_WITH_RULES.contains(&rec.tool_id.as_str()) {
            continue;
        }
        if rec.status.as_deref() == Some("fail") {
            warnings.push(format!(
                "step '{}' failed: {}",
                rec.tool_id,
                rec.detail.as_deref().unwrap_or("no detail")
            ));
        }
    }

    ValidationReport {
        ok: errors.is_empty(),
        errors,
        warnings,
        required_actions,
        proof_token: pack.proof_token.clone(),
    }
}

fn step_failed(pack: &EvidencePack, tool_id: &str) -> bool {
    pack.run_for(tool_id)
        .is_some_and(|r| r.status.as_deref() == Some("fail"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evidence::*;

    fn green_pack() -> EvidencePack {
        let mut pack = EvidencePack::new("2026-03-01T10:15:02.000Z", "/admin/proof-gate");
        pack.proof_token = Some("pg_abc".to_string());
        pack.build_output = Some(BuildOutput {
            present: true,
            text: "ok".to_string(),
            meta: BuildMeta::default(),
        });
        pack.fs_reality_check = Some(FsRealityCheck {
            checked: 2,
            ok: vec!["a".to_string(), "b".to_string()],
            missing: vec![],
            all_imports_ok: true,
        });
        pack.route_nav_audit = Some(RouteNavAudit::default());
        pack.contradiction = Some(ContradictionReport::default());
        pack
    }

    #[test]
    fn green_scenario_passes() {
        let report = validate(&green_pack());
        assert!(report.ok, "errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
        assert_eq!(report.proof_token.as_deref(), Some("pg_abc"));
    }

    #[test]
    fn warnings_never_block() {
        let mut pack = green_pack();
        pack.mini_qa = Some(MiniQa {
            errors: vec!["bad tenant id".to_string()],
            warnings: vec!["no tenants".to_string()],
        });
        pack.route_nav_audit.as_mut().unwrap().summary.warning = 3;
        pack.db_doctor = Some(DbDoctorReport {
            ok: false,
            suspect_count: 2,
            suspects: vec![],
        });
        let report = validate(&pack);
        assert!(report.ok);
        assert!(report.warnings.len() >= 4);
    }

    #[test]
    fn ok_iff_no_errors_across_failures() {
        let mut variants = Vec::new();

        let mut p = green_pack();
        p.build_output = None;
        variants.push(p);

        let mut p = green_pack();
        p.fs_reality_check.as_mut().unwrap().all_imports_ok = false;
        p.fs_reality_check.as_mut().unwrap().missing = vec!["src/App.tsx".to_string()];
        variants.push(p);

        let mut p = green_pack();
        p.route_nav_audit.as_mut().unwrap().summary.critical = 1;
        variants.push(p);

        let mut p = green_pack();
        p.contradiction.as_mut().unwrap().detected = true;
        variants.push(p);

        let mut p = green_pack();
        p.proof_token = None;
        variants.push(p);

        variants.push(green_pack());

        for pack in &variants {
            let report = validate(pack);
            assert_eq!(report.ok, report.errors.is_empty());
        }
        assert_eq!(
            variants.iter().filter(|p| validate(p).ok).count(),
            1,
            "only the untouched green pack passes"
        );
    }

    #[test]
    fn build_error_lines_warn_without_blocking() {
        let mut pack = green_pack();
        pack.build_output.as_mut().unwrap().meta.error_lines = 3;
        pack.runs.push(StepRecord {
            tool_id: "build_output".to_string(),
            started_at: "2026-03-01T10:15:02.000Z".to_string(),
            ended_at: "2026-03-01T10:15:02.004Z".to_string(),
            duration_ms: 4,
            ok: true,
            error: None,
            status: Some("fail".to_string()),
            detail: Some("3 build error line(s)".to_string()),
            console: ConsoleCapture::default(),
        });
        let report = validate(&pack);
        assert!(report.ok);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w == "build output has 3 error line(s)")
        );
    }

    #[test]
    fn errors_become_required_actions() {
        let mut pack = green_pack();
        pack.build_output = None;
        pack.push_action(HumanAction::new("Apply fix SQL", "leads", "CREATE INDEX"));
        let report = validate(&pack);
        assert!(!report.ok);
        assert_eq!(report.required_actions[0].action, "Apply fix SQL");
        assert!(
            report
                .required_actions
                .iter()
                .any(|a| a.location == "build_output")
        );
    }

    #[test]
    fn signature_presence_controls_unsigned_warning() {
        let pack = green_pack();
        let sig = Signature {
            algorithm: "hmac-sha256".to_string(),
            value: "deadbeef".to_string(),
            key_id: None,
        };
        let signed = validate_with_signature(&pack, Some(&sig));
        let unsigned = validate_with_signature(&pack, None);
        assert!(!signed.warnings.iter().any(|w| w.contains("unsigned")));
        assert!(unsigned.warnings.iter().any(|w| w.contains("unsigned")));
        assert_eq!(signed.ok, unsigned.ok);
    }
}
