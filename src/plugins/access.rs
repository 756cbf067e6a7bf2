//! Access Snapshot: who is running the gate.

use crate::core::error::ProofGateError;
use crate::core::evidence::{AccessSnapshot, RoleFlags, StepStatus};
use crate::core::identity::mask_user_id;
use crate::core::recorder::{GateContext, GateStep};

pub struct AccessSnapshotStep;

impl GateStep for AccessSnapshotStep {
    fn id(&self) -> &'static str {
        "access"
    }

    fn run(&self, ctx: &mut GateContext<'_>) -> Result<StepStatus, ProofGateError> {
        let role = ctx.env.role;
        let snapshot = AccessSnapshot {
            authenticated: role.authenticated,
            role: role.primary_role().map(|r| r.to_string()),
            is_owner: role.is_owner(),
            is_admin: role.is_admin(),
            is_client: role.is_client(),
        };

        ctx.pack.role_flags = RoleFlags {
            is_admin: snapshot.is_admin,
            is_owner: snapshot.is_owner,
            is_client: snapshot.is_client,
            is_authenticated: snapshot.authenticated,
        };
        ctx.pack.user_id_masked = role.user_id.as_deref().map(mask_user_id);
        ctx.pack.access_snapshot = Some(snapshot);

        if role.authenticated {
            Ok(StepStatus::Pass)
        } else {
            ctx.console_warn("gate invoked without an authenticated user");
            Ok(StepStatus::Fail("not authenticated".to_string()))
        }
    }
}
