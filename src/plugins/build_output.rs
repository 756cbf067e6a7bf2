//! Build Verification: reads the captured build log.

use crate::core::error::ProofGateError;
use crate::core::evidence::{BuildMeta, BuildOutput, HumanAction, StepStatus};
use crate::core::recorder::{GateContext, GateStep};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

pub const MAX_TEXT_CHARS: usize = 4000;

pub struct BuildOutputStep;

// Compiler diagnostics such as `error[E0425]:` or `error TS2304`, plus `ERROR` log levels.
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\berror(?:\[[A-Z]*\d+\])?:|\bERROR\b|\berror TS\d+)").expect("static regex")
});

pub fn is_error_line(line: &str) -> bool {
    ERROR_LINE.is_match(line)
}

/// Read and summarize the log at `path`. A missing file is reported as
/// absent; any other I/O failure is an error.
pub fn read_build_log(path: &Path, display: &str) -> Result<BuildOutput, ProofGateError> {
    let raw = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(BuildOutput {
                present: false,
                text: String::new(),
                meta: BuildMeta {
                    path: display.to_string(),
                    ..BuildMeta::default()
                },
            });
        }
        Err(e) => return Err(ProofGateError::IoError(e)),
    };
    let text = String::from_utf8_lossy(&raw);
    let mut hasher = Sha256::new();
    hasher.update(&raw);

    Ok(BuildOutput {
        present: !text.trim().is_empty(),
        text: text.chars().take(MAX_TEXT_CHARS).collect(),
        meta: BuildMeta {
            path: display.to_string(),
            bytes: raw.len() as u64,
            line_count: text.lines().count(),
            error_lines: text.lines().filter(|l| is_error_line(l)).count(),
            sha256: Some(format!("{:x}", hasher.finalize())),
        },
    })
}

impl GateStep for BuildOutputStep {
    fn id(&self) -> &'static str {
        "build_output"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let rel = ctx.env.settings.build_log.clone();
        let output = read_build_log(&ctx.env.project_root.join(&rel), &rel)?;

        let status = if !output.present {
            ctx.console_error(format!("no build output at {}", rel));
            ctx.pack.push_action(HumanAction::new(
                "Run the build and capture output",
                &rel,
                "",
            ));
            StepStatus::Fail("build output missing".to_string())
        } else if output.meta.error_lines > 0 {
            ctx.console_error(format!("{} error line(s) in build output", output.meta.error_lines));
            StepStatus::Fail(format!("{} build error line(s)", output.meta.error_lines))
        } else {
            StepStatus::Pass
        };
        ctx.pack.build_output = Some(output);
        Ok(status)
    }
}
