//! DB Doctor: asks the backend's `qa_dependency_check` procedure for
//! objects that look broken and the SQL that would fix them.

use crate::core::error::ProofGateError;
use crate::core::evidence::{DbDoctorReport, DbSuspect, HumanAction, StepStatus};
use crate::core::recorder::{GateContext, GateStep};
use serde::Deserialize;
use serde_json::{Value, json};

pub const DB_DOCTOR_RPC: &str = "qa_dependency_check";

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    ok: bool,
    suspect_count: Option<usize>,
    #[serde(default)]
    suspects: Vec<DbSuspect>,
}

/// Accepts the report object directly or wrapped in a one-row array.
pub fn parse_report(value: Value) -> Result<DbDoctorReport, ProofGateError> {
    let value = match value {
        Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        other => other,
    };
    let raw: RawReport = serde_json::from_value(value)?;
    Ok(DbDoctorReport {
        ok: raw.ok,
        suspect_count: raw.suspect_count.unwrap_or(raw.suspects.len()),
        suspects: raw.suspects,
    })
}

pub struct DbDoctorStep;

impl GateStep for DbDoctorStep {
    fn id(&self) -> &'static str {
        "db_doctor"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let report = parse_report(ctx.env.backend.rpc(DB_DOCTOR_RPC, &json!({}))?)?;

        for suspect in &report.suspects {
            ctx.console_warn(format!("suspect {} {}", suspect.kind, suspect.object));
            ctx.pack.push_action(HumanAction::new(
                "Apply fix SQL",
                &suspect.object,
                &suspect.fix_sql,
            ));
        }
        let status = if report.ok {
            StepStatus::Pass
        } else {
            StepStatus::Fail(format!("{} suspect object(s)", report.suspect_count))
        };
        ctx.pack.db_doctor = Some(report);
        Ok(status)
    }
}
