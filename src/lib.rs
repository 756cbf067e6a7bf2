//! proofgate: diagnostic gate, evidence packs, and the lead intake surfaces
//! that sit beside them.
//!
//! # Architecture
//!
//! ## The gate
//!
//! A fixed sequence of check steps runs serially against the project and the
//! hosted backend. Every step is timed and its console captured; the findings
//! are assembled into an evidence pack, hashed into a proof token, optionally
//! signed, validated, and sealed. The sealed pack is persisted with its
//! verdict and the recurring issue counters are advanced.
//!
//! ## Intake
//!
//! - `lead-webhook`: tenant-scoped lead ingestion with per-tenant, per-minute dedupe
//! - `admin-run-scheduler`: admin-only proxy in front of an external scheduler
//! - `qa isolation`: end-to-end tenant isolation check over the webhook
//!
//! ## State
//!
//! Everything lives in `<project>/.proofgate/data/`: one SQLite database,
//! reached only through `DbBroker`, plus JSONL audit logs.
//!
//! # Examples
//!
//! ```bash
//! proofgate init
//! proofgate gate run --route /dashboard --user operator
//! proofgate tenant add "Acme Roofing" --api-key
//! proofgate serve
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, evidence pack, validator, orchestrator
//! - [`plugins`]: check steps, webhook, scheduler proxy, tenancy, QA harness
//! - [`server`]: HTTP routes over the plugin handlers

mod cli;
pub mod core;
pub mod plugins;
pub mod server;

use crate::cli::{
    BundleCommand, ClaimCommand, Cli, Command, DncCommand, GateCommand, IssuesCommand,
    LeadCommand, OutputFormat, QaCommand, TenantCommand, UserCommand,
};
use crate::core::backend::{Backend, HttpBackend, UnconfiguredBackend};
use crate::core::config::{self, CONFIG_DIR, ProofGateConfig};
use crate::core::error::ProofGateError;
use crate::core::evidence::{EvidencePack, PackSigner};
use crate::core::gate::{FinalizedPack, ProofGate, RemoteSigner};
use crate::core::history::{RunHistory, SqliteRunHistory};
use crate::core::identity::RoleContext;
use crate::core::issues::{IssueLedger, SqliteIssueLedger};
use crate::core::output::compact_line;
use crate::core::scaffold::{self, ScaffoldOptions};
use crate::core::store::Store;
use crate::core::tui::{self, Badge};
use crate::core::{db, logging, time, validate};
use crate::plugins::isolation::{self, CheckStatus, IsolationReport};
use crate::plugins::tenancy::TenancyStore;
use crate::plugins::{bundle, webhook};

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Walk up from `start_dir` to the first directory holding `.proofgate/`.
pub fn find_project_root(start_dir: &Path) -> Result<PathBuf, ProofGateError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(CONFIG_DIR).is_dir() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(ProofGateError::NotFound(
                "'.proofgate' directory not found in current or parent directories. Run `proofgate init` first.".to_string(),
            ));
        }
    }
}

/// A discovered project: root, loaded config, and an initialized store.
struct Project {
    root: PathBuf,
    config: ProofGateConfig,
    store: Store,
}

impl Project {
    fn open(current_dir: &Path) -> Result<Self, ProofGateError> {
        let root = find_project_root(current_dir)?;
        let config = config::load_config(&root)?;
        let data_dir = scaffold::data_dir(&root);
        db::initialize_db(&data_dir)?;
        Ok(Self {
            root,
            config,
            store: Store::project(&data_dir),
        })
    }

    fn backend(&self) -> Box<dyn Backend> {
        match HttpBackend::from_config(&self.config.backend) {
            Ok(b) => Box::new(b),
            Err(_) => Box::new(UnconfiguredBackend),
        }
    }
}

pub fn run() -> Result<(), ProofGateError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match &cli.command {
        Command::Serve { .. } => logging::init_tracing("info"),
        _ => logging::init_tracing("warn"),
    }

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init {
            dir,
            force,
            dry_run,
        } => run_init(dir.unwrap_or(current_dir), force, dry_run),
        command => {
            let project = Project::open(&current_dir)?;
            dispatch(&project, command)
        }
    }
}

fn dispatch(project: &Project, command: Command) -> Result<(), ProofGateError> {
    match command {
        Command::Gate { command } => run_gate_command(project, command),
        Command::Issues { command } => run_issues_command(project, command),
        Command::Claim { command } => run_claim_command(project, command),
        Command::Tenant { command } => run_tenant_command(project, command),
        Command::User { command } => run_user_command(project, command),
        Command::Dnc { command } => run_dnc_command(project, command),
        Command::Lead { command } => run_lead_command(project, command),
        Command::Qa { command } => run_qa_command(project, command),
        Command::Bundle { command } => run_bundle_command(project, command),
        Command::Serve { bind } => run_serve(project, bind),
        Command::Version | Command::Init { .. } => Ok(()),
    }
}

fn run_init(dir: PathBuf, force: bool, dry_run: bool) -> Result<(), ProofGateError> {
    if !dry_run {
        fs::create_dir_all(&dir)?;
    }
    let target_dir = if dir.exists() {
        fs::canonicalize(&dir)?
    } else {
        dir
    };

    if target_dir.join(CONFIG_DIR).exists() && !force && !dry_run {
        tui::render_box(
            "ALREADY INITIALIZED",
            "Use --force to overwrite",
            tui::BoxStyle::Warning,
        );
        return Ok(());
    }

    let report = scaffold::scaffold_project(&ScaffoldOptions {
        target_dir: target_dir.clone(),
        force,
        dry_run,
    })?;
    let verb = if dry_run { "would-write" } else { "wrote" };
    for path in &report.written {
        println!("  {}: {}", verb, path.display());
    }
    for path in &report.skipped {
        println!("  would-skip: {} (exists; pass --force to overwrite)", path.display());
    }
    if !dry_run {
        tui::render_box(
            "PROOFGATE INITIALIZED",
            &target_dir.display().to_string(),
            tui::BoxStyle::Success,
        );
    }
    Ok(())
}

fn resolve_role(
    project: &Project,
    user: Option<String>,
    token: Option<String>,
) -> Result<RoleContext, ProofGateError> {
    let tenancy = TenancyStore::new(&project.store);
    if let Some(token) = token {
        return tenancy
            .resolve_token(&token)?
            .ok_or_else(|| ProofGateError::ValidationError("unknown token".to_string()));
    }
    match user {
        Some(user_id) => tenancy.role_context(&user_id),
        None => Ok(RoleContext::anonymous()),
    }
}

fn gate_failed(errors: usize) -> ProofGateError {
    ProofGateError::ValidationError(format!("gate failed with {} error(s)", errors))
}

fn run_gate_command(project: &Project, command: GateCommand) -> Result<(), ProofGateError> {
    match command {
        GateCommand::Run {
            route,
            format,
            out,
            user,
            token,
        } => {
            let role = resolve_role(project, user, token)?;
            let finalized = run_gate(project, &role, &route)?;
            if let Some(out) = &out {
                bundle::write_json(finalized.pack(), Some(out))?;
            }
            match format {
                OutputFormat::Json => bundle::write_json(
                    &time::command_envelope(
                        "gate.run",
                        if finalized.is_ok() { "ok" } else { "failed" },
                        json!({
                            "run_id": finalized.run_id(),
                            "proof_token": finalized.proof_token(),
                            "report": finalized.report(),
                            "pack": finalized.pack(),
                        }),
                    ),
                    None,
                )?,
                OutputFormat::Text => {
                    tui::render_gate(finalized.pack(), finalized.report());
                    if let Some(out) = &out {
                        println!("  pack written to {}", out.display());
                    }
                }
            }
            if finalized.is_ok() {
                Ok(())
            } else {
                Err(gate_failed(finalized.report().errors.len()))
            }
        }
        GateCommand::Validate { target, format } => {
            let pack = load_pack(project, &target)?;
            let report = validate::validate_stored(&pack)?;
            match format {
                OutputFormat::Json => bundle::write_json(&report, None)?,
                OutputFormat::Text => tui::render_gate(&pack, &report),
            }
            if report.ok {
                Ok(())
            } else {
                Err(gate_failed(report.errors.len()))
            }
        }
        GateCommand::History { limit, format } => {
            let runs = SqliteRunHistory::new(&project.store).recent_runs(limit)?;
            match format {
                OutputFormat::Json => bundle::write_json(&runs, None)?,
                OutputFormat::Text => {
                    if runs.is_empty() {
                        println!("no gate runs recorded");
                    }
                    for run in &runs {
                        let badge = if run.ok { Badge::Pass } else { Badge::Fail };
                        tui::print_badge_line(
                            badge,
                            &format!("{}  {}  {}", run.ts, run.proof_token, run.run_id),
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn run_gate(
    project: &Project,
    role: &RoleContext,
    route: &str,
) -> Result<FinalizedPack, ProofGateError> {
    let backend = project.backend();
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    let signer = RemoteSigner::new(backend.as_ref(), &project.config.backend.sign_endpoint);

    let mut gate = ProofGate::new(
        &project.root,
        &project.config,
        backend.as_ref(),
        &ledger,
        &history,
        plugins::standard_plan(),
    )
    .with_event_log(project.store.events_path("gate"));
    if project.config.backend.url.is_some() {
        gate = gate.with_signer(&signer as &dyn PackSigner);
    }
    gate.run(role, route)
}

/// A pack file on disk, else a stored run by id or proof token.
fn load_pack(project: &Project, target: &str) -> Result<EvidencePack, ProofGateError> {
    let path = Path::new(target);
    if path.is_file() {
        let text = fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&text)?);
    }
    SqliteRunHistory::new(&project.store).load_pack(target)
}

fn run_issues_command(project: &Project, command: IssuesCommand) -> Result<(), ProofGateError> {
    let ledger = SqliteIssueLedger::new(&project.store);
    match command {
        IssuesCommand::List { format } => {
            let rows = ledger.rows()?;
            match format {
                OutputFormat::Json => bundle::write_json(&rows, None)?,
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("no recurring issues");
                    }
                    for row in &rows {
                        println!(
                            "  {:<28} {:>5}  last seen {}",
                            row.code.bold(),
                            row.count,
                            row.last_seen
                        );
                    }
                }
            }
        }
        IssuesCommand::Reset { code } => {
            let removed = ledger.reset(code.as_deref())?;
            println!("reset {} issue code(s)", removed);
        }
    }
    Ok(())
}

fn run_claim_command(project: &Project, command: ClaimCommand) -> Result<(), ProofGateError> {
    let history = SqliteRunHistory::new(&project.store);
    match command {
        ClaimCommand::Add {
            subject,
            absent,
            provenance,
        } => {
            let claim = history.add_claim(&subject, !absent, &provenance)?;
            println!("claim {} recorded", claim.id);
        }
        ClaimCommand::List => {
            for claim in history.claims()? {
                let stance = if claim.asserted_present { "present" } else { "absent" };
                println!(
                    "  {}  {:<7}  {}  ({})",
                    claim.id, stance, claim.subject, claim.provenance
                );
            }
        }
    }
    Ok(())
}

fn run_tenant_command(project: &Project, command: TenantCommand) -> Result<(), ProofGateError> {
    let tenancy = TenancyStore::new(&project.store);
    match command {
        TenantCommand::Add { name, api_key } => {
            let created = tenancy.add_tenant(&name, api_key)?;
            println!("tenant {} created", created.tenant.id);
            if let Some(key) = created.api_key {
                println!("api key (shown once): {}", key.bright_yellow());
            }
        }
        TenantCommand::List => {
            for t in tenancy.list_tenants()? {
                let key = if t.has_api_key { "key" } else { "-" };
                println!("  {}  {:<3}  {}", t.id, key, t.name);
            }
        }
        TenantCommand::Remove { id } => {
            if !tenancy.remove_tenant(&id)? {
                return Err(ProofGateError::NotFound(format!("tenant {}", id)));
            }
            println!("tenant {} removed", id);
        }
    }
    Ok(())
}

fn run_user_command(project: &Project, command: UserCommand) -> Result<(), ProofGateError> {
    let tenancy = TenancyStore::new(&project.store);
    match command {
        UserCommand::Grant { user_id, role } => {
            tenancy.grant_role(&user_id, role)?;
            println!("granted {} to {}", role, user_id);
        }
        UserCommand::Revoke { user_id, role } => {
            if tenancy.revoke_role(&user_id, role)? {
                println!("revoked {} from {}", role, user_id);
            } else {
                println!("{} did not hold {}", user_id, role);
            }
        }
        UserCommand::Token { user_id } => {
            println!("{}", tenancy.issue_token(&user_id)?);
        }
    }
    Ok(())
}

fn run_dnc_command(project: &Project, command: DncCommand) -> Result<(), ProofGateError> {
    let tenancy = TenancyStore::new(&project.store);
    match command {
        DncCommand::Add { tenant_id, phone } => {
            if tenancy.tenant(&tenant_id)?.is_none() {
                return Err(ProofGateError::NotFound(format!("tenant {}", tenant_id)));
            }
            tenancy.add_do_not_call(&tenant_id, &phone)?;
            println!("added {} to the do-not-call list", webhook::phone_digits(&phone));
        }
    }
    Ok(())
}

fn run_lead_command(project: &Project, command: LeadCommand) -> Result<(), ProofGateError> {
    match command {
        LeadCommand::List { tenant, limit } => {
            for lead in webhook::list_leads(&project.store, tenant.as_deref(), limit)? {
                let contact = lead.email.as_deref().or(lead.phone.as_deref()).unwrap_or("-");
                let dnc = if lead.do_not_call { " [dnc]" } else { "" };
                println!(
                    "  {}  {}  {}  {}{}",
                    lead.created_at,
                    lead.id,
                    compact_line(&lead.name, 32),
                    contact,
                    dnc
                );
            }
        }
    }
    Ok(())
}

fn render_isolation(report: &IsolationReport) {
    let style = if report.is_ok() {
        tui::BoxStyle::Success
    } else {
        tui::BoxStyle::Error
    };
    tui::render_box(
        "TENANT ISOLATION",
        &format!(
            "{} passed, {} failed, {} warnings",
            report.passed, report.failed, report.warnings
        ),
        style,
    );
    for check in &report.checks {
        let badge = match check.status {
            CheckStatus::Pass => Badge::Pass,
            CheckStatus::Fail => Badge::Fail,
            CheckStatus::Warn => Badge::Warn,
        };
        tui::print_badge_line(badge, &format!("{}: {}", check.name, check.message));
    }
}

fn run_qa_command(project: &Project, command: QaCommand) -> Result<(), ProofGateError> {
    match command {
        QaCommand::Isolation { format } => {
            let report = isolation::run_isolation_suite(&project.store, Utc::now())?;
            match format {
                OutputFormat::Json => bundle::write_json(
                    &time::command_envelope(
                        "qa.isolation",
                        if report.is_ok() { "ok" } else { "failed" },
                        serde_json::to_value(&report)?,
                    ),
                    None,
                )?,
                OutputFormat::Text => render_isolation(&report),
            }
            if report.is_ok() {
                Ok(())
            } else {
                Err(ProofGateError::ValidationError(format!(
                    "isolation suite failed {} check(s)",
                    report.failed
                )))
            }
        }
    }
}

fn run_bundle_command(project: &Project, command: BundleCommand) -> Result<(), ProofGateError> {
    match command {
        BundleCommand::Export { out } => {
            let support = bundle::build_bundle(&project.store, &project.config)?;
            bundle::write_json(&support, out.as_deref())?;
            if let Some(out) = out {
                eprintln!("bundle written to {}", out.display());
            }
            Ok(())
        }
    }
}

fn run_serve(project: &Project, bind: Option<String>) -> Result<(), ProofGateError> {
    let mut config = project.config.clone();
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(project.store.clone(), &config))
}
