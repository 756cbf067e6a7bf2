//! Contradiction Detector.
//!
//! Two sources disagree with the filesystem as observed in this run:
//! - a stored claim says a module is present, but it is missing now;
//! - the previous run saw the same build log (same hash) yet a different
//!   import verdict.
//!
//! Either one fails the step; the standard plan aborts on it.

use crate::core::error::ProofGateError;
use crate::core::evidence::{
    ClaimContradiction, ContradictionReport, HumanAction, PriorRunContradiction, StepStatus,
};
use crate::core::history::{Claim, PriorRun};
use crate::core::recorder::{GateContext, GateStep};
use crate::plugins::fs_reality::check_paths;
use std::path::Path;

pub const ISSUE_CONTRADICTION: &str = "proof_contradiction";

pub struct ContradictionStep;

pub fn contradicted_claims(root: &Path, claims: &[Claim]) -> Vec<ClaimContradiction> {
    claims
        .iter()
        .filter(|c| c.asserted_present)
        .filter(|c| !check_paths(root, std::slice::from_ref(&c.subject)).all_imports_ok)
        .map(|c| ClaimContradiction {
            claim_id: c.id.clone(),
            subject: c.subject.clone(),
            claimed_at: c.created_at.clone(),
        })
        .collect()
}

pub fn prior_run_mismatch(
    prior: &PriorRun,
    build_sha256: Option<&str>,
    all_imports_ok: bool,
) -> Option<PriorRunContradiction> {
    let current_sha = build_sha256?;
    let prior_sha = prior.build_sha256.as_deref()?;
    let prior_ok = prior.all_imports_ok?;
    (prior_sha == current_sha && prior_ok != all_imports_ok).then(|| PriorRunContradiction {
        run_id: prior.run_id.clone(),
        build_sha256: current_sha.to_string(),
        prior_all_imports_ok: prior_ok,
        current_all_imports_ok: all_imports_ok,
    })
}

impl GateStep for ContradictionStep {
    fn id(&self) -> &'static str {
        "contradiction"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let history = ctx.env.history;
        let claims = contradicted_claims(ctx.env.project_root, &history.claims()?);

        let current_ok = ctx.pack.fs_reality_check.as_ref().map(|f| f.all_imports_ok);
        let build_sha = ctx
            .pack
            .build_output
            .as_ref()
            .and_then(|b| b.meta.sha256.clone());
        let prior_run = match (history.latest_run()?, current_ok) {
            (Some(prior), Some(ok)) => prior_run_mismatch(&prior, build_sha.as_deref(), ok),
            _ => None,
        };

        let detected = !claims.is_empty() || prior_run.is_some();
        for c in &claims {
            ctx.console_error(format!(
                "claim {} says {} exists, but it is missing",
                c.claim_id, c.subject
            ));
        }
        if let Some(p) = &prior_run {
            ctx.console_error(format!(
                "run {} saw the same build ({}) with all_imports_ok={}",
                p.run_id, p.build_sha256, p.prior_all_imports_ok
            ));
        }
        let report = ContradictionReport {
            detected,
            claims,
            prior_run,
        };

        if !detected {
            ctx.pack.contradiction = Some(report);
            return Ok(StepStatus::Pass);
        }

        ctx.pack.bump_issue(ISSUE_CONTRADICTION);
        ctx.pack.push_action(HumanAction::new(
            "Resolve contradiction between claims and filesystem",
            "contradiction",
            "",
        ));
        let reason = format!(
            "{} contradicted claim(s){}",
            report.claims.len(),
            if report.prior_run.is_some() {
                ", prior run disagrees"
            } else {
                ""
            }
        );
        ctx.pack.contradiction = Some(report);
        Ok(StepStatus::Fail(reason))
    }
}
