//! Route & Nav Audit over a static route registry.
//!
//! The registry is a TOML file (`gate.routes_file`):
//!
//! ```toml
//! [[route]]
//! path = "/admin/proof-gate"
//! label = "Proof Gate"
//! component = "src/pages/admin/ProofGate.tsx"
//! required_role = "admin"
//!
//! [[nav]]
//! label = "Proof Gate"
//! path = "/admin/proof-gate"
//! roles = ["admin"]
//! ```
//!
//! Critical findings: duplicate route paths, nav links to no route, route
//! components missing on disk. Warnings: nav items shown to roles that cannot
//! open the route, and non-public routes no nav item reaches.

use crate::core::error::ProofGateError;
use crate::core::evidence::{AuditFinding, AuditSummary, RouteNavAudit, Severity, StepStatus};
use crate::core::identity::Role;
use crate::core::recorder::{GateContext, GateStep};
use crate::plugins::fs_reality::check_paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const ISSUE_DUPLICATE_PATH: &str = "route_duplicate_path";
pub const ISSUE_DEAD_LINK: &str = "nav_dead_link";
pub const ISSUE_COMPONENT_MISSING: &str = "route_component_missing";
pub const ISSUE_ROLE_MISMATCH: &str = "nav_role_mismatch";
pub const ISSUE_ORPHAN: &str = "route_orphan";

const ALL_ROLES: [Role; 3] = [Role::Admin, Role::Owner, Role::Client];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteRegistry {
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDef>,
    #[serde(default, rename = "nav")]
    pub nav: Vec<NavItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteDef {
    pub path: String,
    #[serde(default)]
    pub label: String,
    pub component: Option<String>,
    pub required_role: Option<Role>,
    #[serde(default)]
    pub public: bool,
}

impl RouteDef {
    fn admits(&self, role: Role) -> bool {
        if self.public {
            return true;
        }
        match self.required_role {
            None => true,
            Some(required) => role == required || role == Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavItem {
    pub label: String,
    pub path: String,
    /// Roles the item is shown to; empty means every signed-in role.
    #[serde(default)]
    pub roles: Vec<Role>,
}

pub fn parse_registry(content: &str) -> Result<RouteRegistry, ProofGateError> {
    Ok(toml::from_str(content)?)
}

pub fn load_registry(path: &Path) -> Result<RouteRegistry, ProofGateError> {
    if !path.is_file() {
        return Err(ProofGateError::ConfigError(format!(
            "route registry not found at {}",
            path.display()
        )));
    }
    parse_registry(&fs::read_to_string(path)?)
}

/// `:param` segments in the route pattern match any single link segment.
pub fn path_matches(pattern: &str, link: &str) -> bool {
    let link = link.split(['?', '#']).next().unwrap_or(link);
    let a: Vec<&str> = pattern.trim_end_matches('/').split('/').collect();
    let b: Vec<&str> = link.trim_end_matches('/').split('/').collect();
    a.len() == b.len()
        && a.iter()
            .zip(&b)
            .all(|(p, s)| p.starts_with(':') || p == s)
}

fn finding(code: &str, severity: Severity, path: &str, message: String) -> AuditFinding {
    AuditFinding {
        code: code.to_string(),
        severity,
        path: path.to_string(),
        message,
    }
}

pub fn audit(registry: &RouteRegistry, project_root: &Path) -> RouteNavAudit {
    let mut findings = Vec::new();
    let mut flagged_routes: HashSet<usize> = HashSet::new();
    let mut flagged_nav: HashSet<usize> = HashSet::new();

    let mut seen = HashSet::new();
    for (i, route) in registry.routes.iter().enumerate() {
        if !seen.insert(route.path.as_str()) {
            flagged_routes.insert(i);
            findings.push(finding(
                ISSUE_DUPLICATE_PATH,
                Severity::Critical,
                &route.path,
                format!("route path {} is registered more than once", route.path),
            ));
        }
        if let Some(component) = &route.component
            && !check_paths(project_root, std::slice::from_ref(component)).all_imports_ok
        {
            flagged_routes.insert(i);
            findings.push(finding(
                ISSUE_COMPONENT_MISSING,
                Severity::Critical,
                &route.path,
                format!("component {} does not exist", component),
            ));
        }
    }

    for (i, item) in registry.nav.iter().enumerate() {
        let Some(target) = registry
            .routes
            .iter()
            .find(|r| path_matches(&r.path, &item.path))
        else {
            flagged_nav.insert(i);
            findings.push(finding(
                ISSUE_DEAD_LINK,
                Severity::Critical,
                &item.path,
                format!("nav item '{}' links to no registered route", item.label),
            ));
            continue;
        };
        let shown_to: &[Role] = if item.roles.is_empty() {
            &ALL_ROLES
        } else {
            &item.roles
        };
        let denied: Vec<String> = shown_to
            .iter()
            .filter(|r| !target.admits(**r))
            .map(|r| r.to_string())
            .collect();
        if !denied.is_empty() {
            flagged_nav.insert(i);
            findings.push(finding(
                ISSUE_ROLE_MISMATCH,
                Severity::Warning,
                &item.path,
                format!(
                    "nav item '{}' is shown to {} but the route denies them",
                    item.label,
                    denied.join(", ")
                ),
            ));
        }
    }

    for (i, route) in registry.routes.iter().enumerate() {
        if route.public || route.path.contains(':') {
            continue;
        }
        if !registry.nav.iter().any(|n| path_matches(&route.path, &n.path)) {
            flagged_routes.insert(i);
            findings.push(finding(
                ISSUE_ORPHAN,
                Severity::Warning,
                &route.path,
                format!("route {} is not reachable from navigation", route.path),
            ));
        }
    }

    let critical = findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    let total = registry.routes.len() + registry.nav.len();
    RouteNavAudit {
        summary: AuditSummary {
            critical,
            warning: findings.len() - critical,
            passed: total - flagged_routes.len() - flagged_nav.len(),
        },
        findings,
    }
}

pub struct RouteAuditStep;

impl GateStep for RouteAuditStep {
    fn id(&self) -> &'static str {
        "route_audit"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let root = ctx.env.project_root;
        let registry = load_registry(&root.join(&ctx.env.settings.routes_file))?;
        let report = audit(&registry, root);

        for f in &report.findings {
            ctx.pack.bump_issue(&f.code);
            match f.severity {
                Severity::Critical => ctx.console_error(f.message.clone()),
                Severity::Warning => ctx.console_warn(f.message.clone()),
            }
        }
        let status = if report.summary.critical == 0 {
            StepStatus::Pass
        } else {
            StepStatus::Fail(format!("{} critical finding(s)", report.summary.critical))
        };
        ctx.pack.route_nav_audit = Some(report);
        Ok(status)
    }
}
