use chrono::{DateTime, TimeZone, Utc};
use proofgate::core::db;
use proofgate::core::store::Store;
use proofgate::plugins::tenancy::{CreatedTenant, TenancyStore};
use proofgate::plugins::webhook::{
    TenantCredentials, handle_lead_webhook, list_leads, recent_events,
};
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn setup() -> (TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    db::initialize_db(tmp.path()).expect("init");
    let store = Store::scratch(tmp.path());
    (tmp, store)
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
}

fn by_id(t: &CreatedTenant) -> TenantCredentials {
    TenantCredentials {
        tenant_id: Some(t.tenant.id.clone()),
        api_key: None,
    }
}

#[test]
fn same_contact_within_a_minute_is_one_lead() {
    let (_tmp, store) = setup();
    let tenant = TenancyStore::new(&store).add_tenant("Acme", false).unwrap();
    let body = json!({ "name": "Dana Ruiz", "email": "Dana@Example.com", "phone": "(555) 010-2030" });

    let first = handle_lead_webhook(&store, &by_id(&tenant), &body.to_string(), at(10, 15, 2)).unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.body["success"], true);

    // Same person, different casing and phone formatting, same minute.
    let replay = json!({ "name": "Dana", "email": "dana@example.com", "phone": "555-010-2030" });
    let second = handle_lead_webhook(&store, &by_id(&tenant), &replay.to_string(), at(10, 15, 59)).unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.body["status"], "duplicate");
    assert!(second.body["webhook_id"].is_string());

    let next_minute = handle_lead_webhook(&store, &by_id(&tenant), &body.to_string(), at(10, 16, 0)).unwrap();
    assert_eq!(next_minute.body["success"], true);

    assert_eq!(list_leads(&store, Some(&tenant.tenant.id), 10).unwrap().len(), 2);
    let statuses: Vec<_> = recent_events(&store, 10)
        .unwrap()
        .into_iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses.iter().filter(|s| *s == "created").count(), 2);
    assert_eq!(statuses.iter().filter(|s| *s == "duplicate").count(), 1);
}

#[test]
fn same_contact_for_two_tenants_creates_two_leads() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    let acme = tenancy.add_tenant("Acme", false).unwrap();
    let bolt = tenancy.add_tenant("Bolt", false).unwrap();
    let body = json!({ "name": "Dana", "email": "dana@example.com", "phone": "5550102030" }).to_string();

    let first = handle_lead_webhook(&store, &by_id(&acme), &body, at(9, 0, 1)).unwrap();
    let second = handle_lead_webhook(&store, &by_id(&bolt), &body, at(9, 0, 30)).unwrap();
    assert_eq!(first.body["success"], true);
    assert_eq!(second.body["success"], true);
    assert_ne!(first.body["lead_id"], second.body["lead_id"]);

    assert_eq!(list_leads(&store, Some(&acme.tenant.id), 10).unwrap().len(), 1);
    assert_eq!(list_leads(&store, Some(&bolt.tenant.id), 10).unwrap().len(), 1);
}

#[test]
fn api_key_and_dnc_list_resolve_together() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    let tenant = tenancy.add_tenant("Acme", true).unwrap();
    tenancy.add_do_not_call(&tenant.tenant.id, "+1 555 010 9999").unwrap();

    let creds = TenantCredentials {
        tenant_id: None,
        api_key: tenant.api_key.clone(),
    };
    let resp = handle_lead_webhook(
        &store,
        &creds,
        &json!({ "name": "Lee", "phone": "15550109999" }).to_string(),
        at(9, 0, 0),
    )
    .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["do_not_call"], true);

    let flagged = handle_lead_webhook(
        &store,
        &creds,
        &json!({ "name": "Kim", "email": "kim@example.com", "dnc": true }).to_string(),
        at(9, 0, 0),
    )
    .unwrap();
    assert_eq!(flagged.body["do_not_call"], true);

    let leads = list_leads(&store, Some(&tenant.tenant.id), 10).unwrap();
    assert!(leads.iter().all(|l| l.do_not_call));
}

#[test]
fn rejections_are_recorded_without_a_tenant() {
    let (_tmp, store) = setup();
    let tenant = TenancyStore::new(&store).add_tenant("Acme", false).unwrap();
    let now = at(12, 0, 0);

    let cases = [
        (by_id(&tenant), "[1, 2, 3]".to_string(), 400),
        (
            TenantCredentials {
                tenant_id: Some("not-a-uuid".to_string()),
                api_key: None,
            },
            json!({ "name": "x" }).to_string(),
            400,
        ),
        (
            TenantCredentials {
                tenant_id: Some("9f8e7d6c-5b4a-4392-8170-6f5e4d3c2b1a".to_string()),
                api_key: None,
            },
            json!({ "name": "x" }).to_string(),
            401,
        ),
        (TenantCredentials::default(), json!({ "name": "x" }).to_string(), 401),
        (
            TenantCredentials {
                tenant_id: None,
                api_key: Some("pgk_wrong".to_string()),
            },
            json!({ "name": "x" }).to_string(),
            401,
        ),
    ];
    for (creds, body, expected) in &cases {
        let resp = handle_lead_webhook(&store, creds, body, now).unwrap();
        assert_eq!(resp.status, *expected, "{:?} {}", creds, body);
        assert_eq!(resp.body["success"], false);
        assert!(resp.body["error"].is_string());
    }

    let events = recent_events(&store, 10).unwrap();
    assert_eq!(events.len(), cases.len());
    assert!(events.iter().all(|e| e.status == "rejected" && e.tenant_id.is_none()));
    assert!(list_leads(&store, None, 10).unwrap().is_empty());
}

#[test]
fn tenant_reads_never_cross_tenants() {
    let (_tmp, store) = setup();
    let tenancy = TenancyStore::new(&store);
    let a = tenancy.add_tenant("Tenant A", false).unwrap();
    let b = tenancy.add_tenant("Tenant B", false).unwrap();

    for (i, tenant) in [&a, &a, &b].into_iter().enumerate() {
        let body = json!({ "name": format!("Lead {}", i), "email": format!("lead{}@example.com", i) });
        let resp = handle_lead_webhook(&store, &by_id(tenant), &body.to_string(), at(8, 0, 0)).unwrap();
        assert_eq!(resp.status, 200);
    }

    let a_rows = list_leads(&store, Some(&a.tenant.id), 100).unwrap();
    let b_rows = list_leads(&store, Some(&b.tenant.id), 100).unwrap();
    assert_eq!(a_rows.len(), 2);
    assert_eq!(b_rows.len(), 1);
    assert!(a_rows.iter().all(|l| l.tenant_id.as_deref() == Some(a.tenant.id.as_str())));
    assert!(b_rows.iter().all(|l| l.tenant_id.as_deref() == Some(b.tenant.id.as_str())));

    // Removing a tenant takes its leads with it and leaves the other intact.
    assert!(tenancy.remove_tenant(&a.tenant.id).unwrap());
    assert!(list_leads(&store, Some(&a.tenant.id), 100).unwrap().is_empty());
    assert_eq!(list_leads(&store, None, 100).unwrap().len(), 1);
}
