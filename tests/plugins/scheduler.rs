use proofgate::core::db;
use proofgate::core::error::ProofGateError;
use proofgate::core::identity::Role;
use proofgate::core::store::Store;
use proofgate::plugins::scheduler::{SchedulerClient, handle_admin_run_scheduler};
use proofgate::plugins::tenancy::TenancyStore;
use serde_json::{Value, json};
use std::sync::Mutex;
use tempfile::{TempDir, tempdir};

/// Records every forwarded payload; fails when `down` is set.
#[derive(Default)]
struct RecordingScheduler {
    calls: Mutex<Vec<Value>>,
    down: bool,
}

impl SchedulerClient for RecordingScheduler {
    fn trigger(&self, payload: &Value) -> Result<Value, ProofGateError> {
        self.calls.lock().unwrap().push(payload.clone());
        if self.down {
            return Err(ProofGateError::RemoteStatus {
                status: 503,
                body: "scheduler unavailable".to_string(),
            });
        }
        Ok(json!({ "queued": 3 }))
    }
}

fn tenancy() -> (TempDir, TenancyStore) {
    let tmp = tempdir().expect("tempdir");
    db::initialize_db(tmp.path()).unwrap();
    let tenancy = TenancyStore::new(&Store::scratch(tmp.path()));
    (tmp, tenancy)
}

#[test]
fn admin_token_forwards_action_and_tenants() {
    let (_tmp, tenancy) = tenancy();
    tenancy.grant_role("admin-user-1", Role::Admin).unwrap();
    let token = tenancy.issue_token("admin-user-1").unwrap();
    let scheduler = RecordingScheduler::default();

    let resp = handle_admin_run_scheduler(
        &tenancy,
        &scheduler,
        Some(&format!("Bearer {}", token)),
        &json!({ "action": "follow_up", "tenant_ids": ["t-1", "t-2"], "extra": 1 }).to_string(),
    )
    .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["action"], "follow_up");
    assert_eq!(resp.body["result"]["queued"], 3);
    assert_eq!(resp.body["triggered_by"], "admin-user-1");
    assert!(resp.body["duration_ms"].is_u64());

    let calls = scheduler.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![json!({ "action": "follow_up", "tenant_ids": ["t-1", "t-2"] })]
    );
}

#[test]
fn authentication_precedes_authorization_precedes_validation() {
    let (_tmp, tenancy) = tenancy();
    tenancy.grant_role("owner-1", Role::Owner).unwrap();
    let owner_token = tenancy.issue_token("owner-1").unwrap();
    tenancy.grant_role("admin-1", Role::Admin).unwrap();
    let admin_token = tenancy.issue_token("admin-1").unwrap();
    let scheduler = RecordingScheduler::default();
    let valid = json!({ "action": "sync" }).to_string();

    let cases: [(Option<String>, &str, u16); 6] = [
        (None, valid.as_str(), 401),
        (Some("Token abc".to_string()), valid.as_str(), 401),
        (Some("Bearer pgt_unknown".to_string()), valid.as_str(), 401),
        // Owner with a bad body is still refused on role first.
        (Some(format!("Bearer {}", owner_token)), "{}", 403),
        (Some(format!("Bearer {}", admin_token)), "{}", 400),
        (Some(format!("Bearer {}", admin_token)), "not json", 400),
    ];
    for (auth, body, expected) in cases {
        let resp = handle_admin_run_scheduler(&tenancy, &scheduler, auth.as_deref(), body).unwrap();
        assert_eq!(resp.status, expected, "{:?} {}", auth, body);
        assert_eq!(resp.body["success"], false);
    }
    assert!(scheduler.calls.lock().unwrap().is_empty());
}

#[test]
fn scheduler_failure_is_a_bad_gateway() {
    let (_tmp, tenancy) = tenancy();
    tenancy.grant_role("admin-1", Role::Admin).unwrap();
    let token = tenancy.issue_token("admin-1").unwrap();
    let scheduler = RecordingScheduler {
        down: true,
        ..Default::default()
    };

    let resp = handle_admin_run_scheduler(
        &tenancy,
        &scheduler,
        Some(&format!("Bearer {}", token)),
        &json!({ "action": "sync" }).to_string(),
    )
    .unwrap();
    assert_eq!(resp.status, 502);
    assert_eq!(resp.body["success"], false);
    assert!(resp.body["error"].as_str().unwrap().contains("503"));
}

#[test]
fn revoked_admin_loses_access_immediately() {
    let (_tmp, tenancy) = tenancy();
    tenancy.grant_role("admin-1", Role::Admin).unwrap();
    let token = tenancy.issue_token("admin-1").unwrap();
    tenancy.revoke_role("admin-1", Role::Admin).unwrap();

    let resp = handle_admin_run_scheduler(
        &tenancy,
        &RecordingScheduler::default(),
        Some(&format!("Bearer {}", token)),
        &json!({ "action": "sync" }).to_string(),
    )
    .unwrap();
    assert_eq!(resp.status, 403);
}
