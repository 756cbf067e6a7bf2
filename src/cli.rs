//! CLI struct definitions for the proofgate command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use crate::core::identity::Role;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "proofgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Run the diagnostic gate, seal its evidence pack, and serve the lead webhook and admin scheduler proxy.",
    disable_version_flag = true
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create `.proofgate/` with default config, route registry, and database.
    Init {
        /// Directory to initialize (defaults to the current directory).
        #[clap(long)]
        dir: Option<PathBuf>,
        #[clap(long)]
        force: bool,
        #[clap(long)]
        dry_run: bool,
    },
    /// Run or inspect the proof gate.
    Gate {
        #[clap(subcommand)]
        command: GateCommand,
    },
    /// Recurring issue counters.
    Issues {
        #[clap(subcommand)]
        command: IssuesCommand,
    },
    /// Claims the contradiction check compares against the tree.
    Claim {
        #[clap(subcommand)]
        command: ClaimCommand,
    },
    Tenant {
        #[clap(subcommand)]
        command: TenantCommand,
    },
    /// Local users: role rows and bearer tokens.
    User {
        #[clap(subcommand)]
        command: UserCommand,
    },
    /// Do-not-call list.
    Dnc {
        #[clap(subcommand)]
        command: DncCommand,
    },
    Lead {
        #[clap(subcommand)]
        command: LeadCommand,
    },
    Qa {
        #[clap(subcommand)]
        command: QaCommand,
    },
    Bundle {
        #[clap(subcommand)]
        command: BundleCommand,
    },
    /// Serve the lead webhook and admin scheduler proxy over HTTP.
    Serve {
        /// Overrides `[server] bind`.
        #[clap(long)]
        bind: Option<String>,
    },
    Version,
}

#[derive(Subcommand, Debug)]
pub(crate) enum GateCommand {
    /// Run every check and seal the evidence pack.
    Run {
        /// Route the pack is captured for.
        #[clap(long, default_value = "/")]
        route: String,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// Also write the sealed pack to this file.
        #[clap(long)]
        out: Option<PathBuf>,
        /// Run as this local user (roles from `user grant`).
        #[clap(long, conflicts_with = "token")]
        user: Option<String>,
        /// Run as the owner of this bearer token.
        #[clap(long)]
        token: Option<String>,
    },
    /// Re-validate a pack from a file, a run id, or a proof token.
    Validate {
        target: String,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Recent gate runs, newest first.
    History {
        #[clap(long, default_value_t = 10)]
        limit: usize,
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum IssuesCommand {
    List {
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Zero one issue code, or every code.
    Reset {
        #[clap(long)]
        code: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ClaimCommand {
    /// Record that a path exists (or, with `--absent`, that it does not).
    Add {
        subject: String,
        #[clap(long)]
        absent: bool,
        #[clap(long, default_value = "cli")]
        provenance: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub(crate) enum TenantCommand {
    Add {
        name: String,
        /// Mint an API key; it is printed once and stored hashed.
        #[clap(long)]
        api_key: bool,
    },
    List,
    /// Remove a tenant with its leads, deliveries, and DNC entries.
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub(crate) enum UserCommand {
    Grant {
        user_id: String,
        #[clap(value_parser = parse_role)]
        role: Role,
    },
    Revoke {
        user_id: String,
        #[clap(value_parser = parse_role)]
        role: Role,
    },
    /// Mint a bearer token for the admin scheduler proxy.
    Token { user_id: String },
}

#[derive(Subcommand, Debug)]
pub(crate) enum DncCommand {
    Add { tenant_id: String, phone: String },
}

#[derive(Subcommand, Debug)]
pub(crate) enum LeadCommand {
    List {
        #[clap(long)]
        tenant: Option<String>,
        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum QaCommand {
    /// Two throwaway tenants, webhook deliveries, and cross-tenant reads.
    Isolation {
        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum BundleCommand {
    /// Write the support bundle to a file, or stdout.
    Export {
        #[clap(long)]
        out: Option<PathBuf>,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse::<Role>().map_err(|e| e.to_string())
}
