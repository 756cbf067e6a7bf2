//! QA access status and the mini-QA sweep.

use crate::core::error::ProofGateError;
use crate::core::evidence::{MiniQa, QaAccessStatus, StepStatus};
use crate::core::identity::RoleContext;
use crate::core::recorder::{GateContext, GateStep};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub fn qa_access(role: &RoleContext) -> QaAccessStatus {
    if role.is_admin() || role.is_owner() {
        QaAccessStatus::Granted
    } else {
        QaAccessStatus::Denied
    }
}

/// Pull `id` out of each row, as a string whatever its JSON type.
pub fn tenant_ids_from_rows(rows: &[Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| match row.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

pub fn sweep(
    tenant_ids: &[String],
    backend_configured: bool,
    access: QaAccessStatus,
    recurring: &BTreeMap<String, u64>,
    threshold: u64,
) -> MiniQa {
    let mut qa = MiniQa::default();

    if !backend_configured {
        qa.errors.push("backend URL is not configured".to_string());
    }
    let mut seen = HashSet::new();
    for id in tenant_ids {
        if Uuid::parse_str(id).is_err() {
            qa.errors.push(format!("malformed tenant id: {}", id));
        }
        if !seen.insert(id.as_str()) {
            qa.errors.push(format!("duplicate tenant id: {}", id));
        }
    }

    if tenant_ids.is_empty() {
        qa.warnings.push("no tenants sampled".to_string());
    }
    for (code, count) in recurring {
        if *count >= threshold {
            qa.warnings
                .push(format!("recurring issue {} seen {} times", code, count));
        }
    }
    if access == QaAccessStatus::Denied {
        qa.warnings
            .push("QA access denied for the current user".to_string());
    }
    qa
}

pub struct MiniQaStep;

impl GateStep for MiniQaStep {
    fn id(&self) -> &'static str {
        "mini_qa"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let env_role = ctx.env.role;
        let settings = ctx.env.settings;
        let access = qa_access(env_role);
        ctx.pack.qa_access_status = Some(access);

        let sample = ctx.env.backend.select(
            "tenants",
            &[
                ("select", "id".to_string()),
                ("limit", settings.tenant_sample.to_string()),
            ],
        );
        let mut transport_warning = None;
        let tenant_ids = match sample {
            Ok(rows) => tenant_ids_from_rows(&rows),
            Err(e) => {
                ctx.console_warn(format!("tenant sample failed: {}", e));
                transport_warning = Some(format!("tenant sample unavailable: {}", e));
                Vec::new()
            }
        };

        let mut qa = sweep(
            &tenant_ids,
            ctx.env.backend_config.url.is_some(),
            access,
            &ctx.pack.recurring_issue_counts,
            settings.recurring_threshold,
        );
        qa.warnings.extend(transport_warning);
        ctx.pack.tenant_ids = tenant_ids;

        let status = if qa.errors.is_empty() {
            StepStatus::Pass
        } else {
            StepStatus::Fail(qa.errors.join("; "))
        };
        ctx.pack.mini_qa = Some(qa);
        Ok(status)
    }
}
