//! Lead webhook: tenant resolution, deduplication, do-not-call.
//!
//! The handler is synchronous and transport-agnostic; the HTTP server maps
//! headers and body in and [`HandlerResponse`] out. Deduplication rests on
//! the `leads(tenant_id, dedupe_key)` unique constraint, so two deliveries
//! racing for the same key cannot both create a lead. Tenants never share
//! a key.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::ProofGateError;
use crate::core::evidence::sha256_hex;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::tenancy::{Tenant, tenant_by_api_key_in, tenant_by_id_in};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use uuid::Uuid;

pub const HEADER_TENANT_ID: &str = "x-tenant-id";
pub const HEADER_API_KEY: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::new(status, json!({ "success": false, "error": message }))
    }
}

/// Credentials a delivery may carry. Tenant id wins when both are present.
#[derive(Debug, Clone, Default)]
pub struct TenantCredentials {
    pub tenant_id: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lead {
    pub id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: String,
    pub qa_nonce: Option<String>,
    pub do_not_call: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub tenant_id: Option<String>,
    pub status: String,
    pub lead_id: Option<String>,
    pub received_at: String,
}

pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn str_field<'a>(body: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// The lead fields we understand, pulled out of an arbitrary JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFields {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: String,
    pub qa_nonce: Option<String>,
    pub do_not_call: bool,
}

impl LeadFields {
    pub fn from_body(body: &Map<String, Value>) -> Self {
        let name = str_field(body, &["name", "full_name"])
            .map(str::to_string)
            .unwrap_or_else(|| {
                [str_field(body, &["first_name"]), str_field(body, &["last_name"])]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ")
            });
        Self {
            name,
            email: str_field(body, &["email"]).map(str::to_string),
            phone: str_field(body, &["phone", "phone_number"]).map(str::to_string),
            source: str_field(body, &["source"]).unwrap_or("webhook").to_string(),
            qa_nonce: str_field(body, &["qa_nonce"]).map(str::to_string),
            do_not_call: ["do_not_call", "dnc"]
                .iter()
                .any(|k| body.get(*k).and_then(Value::as_bool).unwrap_or(false)),
        }
    }
}

/// `sha256(lower(email) | digits(phone) | minute)`. With neither contact
/// field present, the body (keys sorted) stands in for the contact.
pub fn dedupe_key(fields: &LeadFields, body: &Map<String, Value>, received: &DateTime<Utc>) -> String {
    let email = fields
        .email
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    let phone = fields.phone.as_deref().map(phone_digits).unwrap_or_default();
    let contact = if email.is_empty() && phone.is_empty() {
        let sorted: std::collections::BTreeMap<_, _> = body.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    } else {
        format!("{}|{}", email, phone)
    };
    sha256_hex(format!("{}|{}", contact, time::minute_bucket(received)).as_bytes())
}

enum Resolution {
    Tenant(Tenant),
    Reject(HandlerResponse),
}

fn resolve_tenant(conn: &Connection, creds: &TenantCredentials) -> Result<Resolution, ProofGateError> {
    if let Some(raw) = creds.tenant_id.as_deref().map(str::trim) {
        let Ok(id) = Uuid::parse_str(raw) else {
            return Ok(Resolution::Reject(HandlerResponse::error(
                400,
                "X-Tenant-Id must be a UUID",
            )));
        };
        return Ok(match tenant_by_id_in(conn, &id.to_string())? {
            Some(t) => Resolution::Tenant(t),
            None => Resolution::Reject(HandlerResponse::error(401, "unknown tenant")),
        });
    }
    if let Some(key) = creds.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(match tenant_by_api_key_in(conn, key)? {
            Some(t) => Resolution::Tenant(t),
            None => Resolution::Reject(HandlerResponse::error(401, "invalid API key")),
        });
    }
    Ok(Resolution::Reject(HandlerResponse::error(
        401,
        "X-Tenant-Id or X-Api-Key required",
    )))
}

fn record_event(
    conn: &Connection,
    webhook_id: &str,
    tenant_id: Option<&str>,
    status: &str,
    lead_id: Option<&str>,
    payload: &str,
    received_at: &str,
) -> Result<(), ProofGateError> {
    conn.execute(
        "INSERT INTO webhook_events(id, tenant_id, status, lead_id, payload, received_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![webhook_id, tenant_id, status, lead_id, payload, received_at],
    )?;
    Ok(())
}

fn on_dnc_list(conn: &Connection, tenant_id: &str, phone: Option<&str>) -> Result<bool, ProofGateError> {
    let Some(digits) = phone.map(phone_digits).filter(|d| !d.is_empty()) else {
        return Ok(false);
    };
    Ok(conn
        .query_row(
            "SELECT 1 FROM do_not_call WHERE tenant_id = ?1 AND phone = ?2",
            params![tenant_id, digits],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Handle one delivery received at `received`.
pub fn handle_lead_webhook(
    store: &Store,
    creds: &TenantCredentials,
    raw_body: &str,
    received: DateTime<Utc>,
) -> Result<HandlerResponse, ProofGateError> {
    let webhook_id = Uuid::new_v4().to_string();
    let received_at = time::rfc3339_millis(&received);
    let broker = DbBroker::new(&store.root);
    let db_path = db::proofgate_db_path(&store.root);

    broker.with_conn(&db_path, "webhook", Some(&webhook_id), "leads.webhook", |conn| {
        let body = match serde_json::from_str::<Value>(raw_body) {
            Ok(Value::Object(map)) => map,
            _ => {
                record_event(conn, &webhook_id, None, "rejected", None, raw_body, &received_at)?;
                return Ok(HandlerResponse::error(400, "body must be a JSON object"));
            }
        };

        let tenant = match resolve_tenant(conn, creds)? {
            Resolution::Tenant(t) => t,
            Resolution::Reject(resp) => {
                warn!(status = resp.status, "webhook delivery rejected");
                record_event(conn, &webhook_id, None, "rejected", None, raw_body, &received_at)?;
                return Ok(resp);
            }
        };

        let fields = LeadFields::from_body(&body);
        let key = dedupe_key(&fields, &body, &received);
        let do_not_call = fields.do_not_call || on_dnc_list(conn, &tenant.id, fields.phone.as_deref())?;
        let lead_id = Uuid::new_v4().to_string();

        let inserted = conn.execute(
            "INSERT INTO leads(id, tenant_id, name, email, phone, source, qa_nonce, dedupe_key, do_not_call, payload, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                lead_id,
                tenant.id,
                fields.name,
                fields.email,
                fields.phone,
                fields.source,
                fields.qa_nonce,
                key,
                do_not_call,
                raw_body,
                received_at
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if db::is_unique_violation(&e) => {
                info!(tenant_id = %tenant.id, webhook_id = %webhook_id, "duplicate lead delivery");
                record_event(conn, &webhook_id, Some(&tenant.id), "duplicate", None, raw_body, &received_at)?;
                return Ok(HandlerResponse::new(
                    200,
                    json!({ "status": "duplicate", "webhook_id": webhook_id }),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        record_event(conn, &webhook_id, Some(&tenant.id), "created", Some(&lead_id), raw_body, &received_at)?;
        info!(tenant_id = %tenant.id, lead_id = %lead_id, do_not_call, "lead created");
        Ok(HandlerResponse::new(
            200,
            json!({
                "success": true,
                "lead_id": lead_id,
                "webhook_id": webhook_id,
                "do_not_call": do_not_call
            }),
        ))
    })
}

fn lead_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        source: row.get(5)?,
        qa_nonce: row.get(6)?,
        do_not_call: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const LEAD_COLUMNS: &str =
    "id, tenant_id, name, email, phone, source, qa_nonce, do_not_call, created_at";

/// Leads of one tenant (or all tenants), newest first.
pub fn list_leads(
    store: &Store,
    tenant_id: Option<&str>,
    limit: usize,
) -> Result<Vec<Lead>, ProofGateError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&db::proofgate_db_path(&store.root), "proofgate", None, "leads.list", |conn| {
        let rows = match tenant_id {
            Some(t) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM leads WHERE tenant_id = ?1 ORDER BY created_at DESC, id LIMIT ?2",
                    LEAD_COLUMNS
                ))?;
                stmt.query_map(params![t, limit as i64], lead_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM leads ORDER BY created_at DESC, id LIMIT ?1",
                    LEAD_COLUMNS
                ))?;
                stmt.query_map(params![limit as i64], lead_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    })
}

pub fn leads_with_nonce(store: &Store, nonce: &str) -> Result<Vec<Lead>, ProofGateError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&db::proofgate_db_path(&store.root), "proofgate", None, "leads.by_nonce", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM leads WHERE qa_nonce = ?1 ORDER BY created_at, id",
            LEAD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![nonce], lead_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Delete every delivery event whose raw payload carries `nonce`, including
/// rejected deliveries that never resolved a tenant. Returns the row count.
pub fn purge_events_with_nonce(store: &Store, nonce: &str) -> Result<usize, ProofGateError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&db::proofgate_db_path(&store.root), "proofgate", None, "webhook.purge", |conn| {
        Ok(conn.execute(
            "DELETE FROM webhook_events WHERE instr(payload, ?1) > 0",
            params![nonce],
        )?)
    })
}

pub fn recent_events(store: &Store, limit: usize) -> Result<Vec<WebhookEvent>, ProofGateError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&db::proofgate_db_path(&store.root), "proofgate", None, "webhook.events", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, status, lead_id, received_at FROM webhook_events
             ORDER BY received_at DESC, id LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(WebhookEvent {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                status: row.get(2)?,
                lead_id: row.get(3)?,
                received_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}
