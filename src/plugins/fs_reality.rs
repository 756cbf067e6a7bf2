//! Filesystem Reality Check.
//!
//! Every configured import path must exist under the project root as a
//! non-empty file. Missing paths become human actions and issue counts.

use crate::core::error::ProofGateError;
use crate::core::evidence::{FsRealityCheck, HumanAction, StepStatus};
use crate::core::recorder::{GateContext, GateStep};
use std::path::Path;

pub const ISSUE_MISSING_IMPORT: &str = "fs_missing_import";

pub struct FsRealityStep;

/// Split `paths` into present and missing, relative to `root`.
pub fn check_paths(root: &Path, paths: &[String]) -> FsRealityCheck {
    let mut ok = Vec::new();
    let mut missing = Vec::new();
    for rel in paths {
        let present = root
            .join(rel)
            .metadata()
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if present {
            ok.push(rel.clone());
        } else {
            missing.push(rel.clone());
        }
    }
    FsRealityCheck {
        checked: paths.len(),
        all_imports_ok: missing.is_empty(),
        ok,
        missing,
    }
}

impl GateStep for FsRealityStep {
    fn id(&self) -> &'static str {
        "fs_reality"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let settings = ctx.env.settings;
        if settings.import_paths.is_empty() {
            ctx.console_warn("no import paths configured; nothing to check");
        }
        let check = check_paths(ctx.env.project_root, &settings.import_paths);

        for path in &check.missing {
            ctx.console_error(format!("missing module: {}", path));
            ctx.pack
                .push_action(HumanAction::new("Restore missing module", path, ""));
            ctx.pack.bump_issue(ISSUE_MISSING_IMPORT);
        }

        let status = if check.all_imports_ok {
            StepStatus::Pass
        } else {
            StepStatus::Fail(format!("{} missing import(s)", check.missing.len()))
        };
        ctx.pack.fs_reality_check = Some(check);
        Ok(status)
    }
}
