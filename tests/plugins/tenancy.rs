use chrono::Utc;
use proofgate::core::db;
use proofgate::core::error::ProofGateError;
use proofgate::core::identity::Role;
use proofgate::core::store::Store;
use proofgate::plugins::isolation::{CheckStatus, run_isolation_suite};
use proofgate::plugins::tenancy::TenancyStore;
use proofgate::plugins::webhook::{TenantCredentials, handle_lead_webhook, list_leads, recent_events};
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn setup() -> (TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    db::initialize_db(tmp.path()).expect("init");
    let store = Store::scratch(tmp.path());
    (tmp, store)
}

#[test]
fn isolation_suite_leaves_existing_tenants_untouched() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    let existing = tenancy.add_tenant("Acme Roofing", true).unwrap();
    let creds = TenantCredentials {
        tenant_id: Some(existing.tenant.id.clone()),
        api_key: None,
    };
    let resp = handle_lead_webhook(
        &store,
        &creds,
        &json!({ "name": "Real Customer", "email": "real@example.com" }).to_string(),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(resp.status, 200);

    let report = run_isolation_suite(&store, Utc::now()).unwrap();
    assert!(report.is_ok(), "{:#?}", report.checks);
    assert!(report.nonce.starts_with("qa_"));
    assert!(report.checks.iter().all(|c| c.status == CheckStatus::Pass));
    assert_eq!(report.checks.last().unwrap().name, "cleanup");

    let tenants = tenancy.list_tenants().unwrap();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].id, existing.tenant.id);
    let leads = list_leads(&store, None, 100).unwrap();
    assert_eq!(leads.len(), 1);
    assert!(leads[0].qa_nonce.is_none());
    // Only the real delivery's event survives, rejected QA deliveries included.
    let events = recent_events(&store, 100).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tenant_id.as_deref(), Some(existing.tenant.id.as_str()));
}

#[test]
fn repeated_suites_do_not_interfere() {
    let (_tmp, store) = setup();
    let first = run_isolation_suite(&store, Utc::now()).unwrap();
    let second = run_isolation_suite(&store, Utc::now()).unwrap();
    assert!(first.is_ok() && second.is_ok());
    assert_ne!(first.nonce, second.nonce);
    assert_eq!(second.passed, second.checks.len());
}

#[test]
fn tokens_are_per_user_and_roles_accumulate() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    tenancy.grant_role("ops-1", Role::Owner).unwrap();
    tenancy.grant_role("ops-1", Role::Client).unwrap();
    tenancy.grant_role("ops-2", Role::Admin).unwrap();

    let t1 = tenancy.issue_token("ops-1").unwrap();
    let t1_again = tenancy.issue_token("ops-1").unwrap();
    let t2 = tenancy.issue_token("ops-2").unwrap();
    assert_ne!(t1, t1_again);

    let ctx1 = tenancy.resolve_token(&t1).unwrap().unwrap();
    assert_eq!(ctx1.user_id.as_deref(), Some("ops-1"));
    assert_eq!(ctx1.roles, vec![Role::Owner, Role::Client]);
    assert_eq!(ctx1.primary_role(), Some(Role::Owner));
    assert!(!ctx1.is_admin());
    assert_eq!(tenancy.resolve_token(&t1_again).unwrap().unwrap(), ctx1);

    assert!(tenancy.resolve_token(&t2).unwrap().unwrap().is_admin());
    assert!(!tenancy.revoke_role("ops-2", Role::Owner).unwrap());
}

#[test]
fn do_not_call_needs_digits() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    let tenant = tenancy.add_tenant("Acme", false).unwrap();

    let err = tenancy.add_do_not_call(&tenant.tenant.id, "n/a").unwrap_err();
    assert!(matches!(err, ProofGateError::ValidationError(_)));
    tenancy.add_do_not_call(&tenant.tenant.id, "(555) 010-7777").unwrap();
    // Same number in another format is a no-op.
    tenancy.add_do_not_call(&tenant.tenant.id, "555.010.7777").unwrap();
    assert!(tenancy.remove_tenant(&tenant.tenant.id).unwrap());
    assert!(!tenancy.remove_tenant(&tenant.tenant.id).unwrap());
}
