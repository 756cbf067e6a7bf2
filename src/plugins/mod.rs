//! Check steps and the operational surfaces built on the core.

pub mod access;
pub mod build_output;
pub mod bundle;
pub mod contradiction;
pub mod db_doctor;
pub mod edge_console;
pub mod edge_preflight;
pub mod fs_reality;
pub mod isolation;
pub mod mini_qa;
pub mod route_audit;
pub mod scheduler;
pub mod tenancy;
pub mod webhook;

use crate::core::gate::{GatePlan, OnError, OnFail};

/// The fixed production sequence.
pub fn standard_plan() -> GatePlan {
    use OnError::{Fail, Skip};
    use OnFail::{Abort, Continue};

    GatePlan::new()
        .then(access::AccessSnapshotStep, Continue, Fail)
        .then(fs_reality::FsRealityStep, Continue, Fail)
        .then(build_output::BuildOutputStep, Continue, Fail)
        .then(contradiction::ContradictionStep, Abort, Fail)
        .then(route_audit::RouteAuditStep, Continue, Fail)
        .then(db_doctor::DbDoctorStep, Continue, Skip)
        .then(edge_preflight::EdgePreflightStep, Continue, Fail)
        .then(mini_qa::MiniQaStep, Continue, Fail)
        .then(edge_console::EdgeConsoleStep, Continue, Skip)
}
