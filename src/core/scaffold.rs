//! `proofgate init`: lay down `.proofgate/` in a project.
//!
//! Existing files are never overwritten without `force`; `dry_run` only
//! reports what would be written.

use crate::core::assets;
use crate::core::config::{CONFIG_DIR, CONFIG_FILE};
use crate::core::db;
use crate::core::error::ProofGateError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DATA_DIR: &str = "data";

pub struct ScaffoldOptions {
    pub target_dir: PathBuf,
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

fn write_file(
    opts: &ScaffoldOptions,
    report: &mut ScaffoldReport,
    rel_path: &str,
    template: &str,
) -> Result<(), ProofGateError> {
    let content = assets::get_template(template)
        .ok_or_else(|| ProofGateError::NotFound(format!("template {}", template)))?;
    let dest = opts.target_dir.join(rel_path);

    if dest.exists() && !opts.force {
        if opts.dry_run {
            report.skipped.push(dest);
            return Ok(());
        }
        return Err(ProofGateError::ValidationError(format!(
            "refusing to overwrite existing path without --force: {}",
            dest.display()
        )));
    }
    if !opts.dry_run {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, content)?;
    }
    report.written.push(dest);
    Ok(())
}

pub fn data_dir(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(DATA_DIR)
}

pub fn scaffold_project(opts: &ScaffoldOptions) -> Result<ScaffoldReport, ProofGateError> {
    let mut report = ScaffoldReport::default();
    write_file(opts, &mut report, &format!("{}/{}", CONFIG_DIR, CONFIG_FILE), "config.toml")?;
    write_file(opts, &mut report, &format!("{}/routes.toml", CONFIG_DIR), "routes.toml")?;
    write_file(opts, &mut report, &format!("{}/.gitignore", CONFIG_DIR), "gitignore")?;

    if !opts.dry_run {
        db::initialize_db(&data_dir(&opts.target_dir))?;
        info!(root = %opts.target_dir.display(), "project initialized");
    }
    Ok(report)
}
