//! Edge Console Capture: the newest console run of one backend function.

use crate::core::error::ProofGateError;
use crate::core::evidence::{EdgeConsoleRun, StepStatus};
use crate::core::recorder::{GateContext, GateStep};
use serde_json::Value;

pub const CONSOLE_TABLE: &str = "edge_console_runs";

fn count_of(row: &Value, count_key: &str, list_key: &str) -> u64 {
    row.get(count_key)
        .and_then(Value::as_u64)
        .or_else(|| {
            row.get(list_key)
                .and_then(Value::as_array)
                .map(|a| a.len() as u64)
        })
        .unwrap_or(0)
}

/// Counts come from `error_count`/`warning_count`, falling back to the
/// length of `errors`/`warnings`.
pub fn parse_console_row(function_name: &str, row: Value) -> EdgeConsoleRun {
    EdgeConsoleRun {
        function_name: row
            .get("function_name")
            .and_then(Value::as_str)
            .unwrap_or(function_name)
            .to_string(),
        created_at: row
            .get("created_at")
            .and_then(Value::as_str)
            .map(str::to_string),
        error_count: count_of(&row, "error_count", "errors"),
        warning_count: count_of(&row, "warning_count", "warnings"),
        raw: row,
    }
}

pub struct EdgeConsoleStep;

impl GateStep for EdgeConsoleStep {
    fn id(&self) -> &'static str {
        "edge_console"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let function = ctx.env.backend_config.console_function.clone();
        let rows = ctx.env.backend.select(
            CONSOLE_TABLE,
            &[
                ("function_name", format!("eq.{}", function)),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ],
        )?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(StepStatus::Skip(format!("no console runs for {}", function)));
        };

        let run = parse_console_row(&function, row);
        let status = if run.error_count == 0 {
            StepStatus::Pass
        } else {
            ctx.console_warn(format!(
                "latest {} run logged {} error(s)",
                run.function_name, run.error_count
            ));
            StepStatus::Fail(format!("{} console error(s)", run.error_count))
        };
        ctx.pack.latest_edge_console_run = Some(run);
        Ok(status)
    }
}
