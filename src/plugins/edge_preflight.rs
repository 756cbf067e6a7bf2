//! Edge Preflight probe.

use crate::core::error::ProofGateError;
use crate::core::evidence::{EdgePreflightReport, StepStatus};
use crate::core::recorder::{GateContext, GateStep};
use serde_json::{Value, json};

/// The function answers either `{report: {...}}` or the bare report.
pub fn parse_preflight(value: Value) -> EdgePreflightReport {
    let report = match value {
        Value::Object(mut obj) if obj.get("report").is_some_and(Value::is_object) => {
            obj.remove("report").unwrap_or(Value::Null)
        }
        other => other,
    };
    EdgePreflightReport {
        ok: report.get("ok").and_then(Value::as_bool).unwrap_or(false),
        suspect_count: report.get("suspect_count").and_then(Value::as_u64),
        report,
    }
}

pub struct EdgePreflightStep;

impl GateStep for EdgePreflightStep {
    fn id(&self) -> &'static str {
        "edge_preflight"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let endpoint = &ctx.env.backend_config.preflight_endpoint;
        let resp = ctx
            .env
            .backend
            .invoke_function(endpoint, &json!({ "mode": "preflight" }))?;
        let report = parse_preflight(resp);

        let status = if report.ok {
            StepStatus::Pass
        } else {
            ctx.console_warn(format!(
                "preflight reported not ok ({} suspect(s))",
                report.suspect_count.unwrap_or(0)
            ));
            StepStatus::Fail("preflight reported not ok".to_string())
        };
        ctx.pack.edge_preflight = Some(report);
        Ok(status)
    }
}
