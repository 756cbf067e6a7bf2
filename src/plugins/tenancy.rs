//! Tenants, user roles, and bearer tokens.
//!
//! API keys and access tokens are stored only as SHA-256 hex; the plaintext
//! is returned once, at creation. The `*_in` functions take a connection so
//! callers already inside `DbBroker::with_conn` can use them.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::ProofGateError;
use crate::core::evidence::sha256_hex;
use crate::core::identity::{Role, RoleContext};
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub has_api_key: bool,
    pub created_at: String,
}

/// A freshly created tenant and, if one was requested, its API key.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTenant {
    pub tenant: Tenant,
    pub api_key: Option<String>,
}

pub fn hash_secret(secret: &str) -> String {
    sha256_hex(secret.as_bytes())
}

fn tenant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        has_api_key: row.get::<_, Option<String>>(2)?.is_some(),
        created_at: row.get(3)?,
    })
}

pub fn tenant_by_id_in(conn: &Connection, id: &str) -> Result<Option<Tenant>, ProofGateError> {
    Ok(conn
        .query_row(
            "SELECT id, name, api_key_hash, created_at FROM tenants WHERE id = ?1",
            params![id],
            tenant_from_row,
        )
        .optional()?)
}

pub fn tenant_by_api_key_in(
    conn: &Connection,
    api_key: &str,
) -> Result<Option<Tenant>, ProofGateError> {
    Ok(conn
        .query_row(
            "SELECT id, name, api_key_hash, created_at FROM tenants WHERE api_key_hash = ?1",
            params![hash_secret(api_key)],
            tenant_from_row,
        )
        .optional()?)
}

pub fn insert_tenant_in(
    conn: &Connection,
    name: &str,
    with_api_key: bool,
) -> Result<CreatedTenant, ProofGateError> {
    let id = Uuid::new_v4().to_string();
    let api_key = with_api_key.then(|| format!("pgk_{}", Uuid::new_v4().simple()));
    let created_at = time::now_epoch_z();
    conn.execute(
        "INSERT INTO tenants(id, name, api_key_hash, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![id, name, api_key.as_deref().map(hash_secret), created_at],
    )?;
    Ok(CreatedTenant {
        tenant: Tenant {
            id,
            name: name.to_string(),
            has_api_key: api_key.is_some(),
            created_at,
        },
        api_key,
    })
}

pub fn roles_in(conn: &Connection, user_id: &str) -> Result<Vec<Role>, ProofGateError> {
    let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
    let names = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    // Unknown role names in the table are ignored rather than trusted.
    Ok(names.iter().filter_map(|n| n.parse().ok()).collect())
}

pub fn user_for_token_in(conn: &Connection, token: &str) -> Result<Option<String>, ProofGateError> {
    Ok(conn
        .query_row(
            "SELECT user_id FROM access_tokens WHERE token_hash = ?1",
            params![hash_secret(token)],
            |row| row.get(0),
        )
        .optional()?)
}

pub struct TenancyStore {
    root: std::path::PathBuf,
}

impl TenancyStore {
    pub fn new(store: &Store) -> Self {
        Self {
            root: store.root.clone(),
        }
    }

    fn with_conn<R>(
        &self,
        op: &str,
        f: impl FnOnce(&Connection) -> Result<R, ProofGateError>,
    ) -> Result<R, ProofGateError> {
        DbBroker::new(&self.root).with_conn(&db::proofgate_db_path(&self.root), "proofgate", None, op, f)
    }

    pub fn add_tenant(&self, name: &str, with_api_key: bool) -> Result<CreatedTenant, ProofGateError> {
        if name.trim().is_empty() {
            return Err(ProofGateError::ValidationError(
                "tenant name must not be empty".to_string(),
            ));
        }
        let created = self.with_conn("tenants.add", |conn| insert_tenant_in(conn, name, with_api_key))?;
        info!(tenant_id = %created.tenant.id, "tenant created");
        Ok(created)
    }

    pub fn list_tenants(&self) -> Result<Vec<Tenant>, ProofGateError> {
        self.with_conn("tenants.list", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, api_key_hash, created_at FROM tenants ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map([], tenant_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn tenant(&self, id: &str) -> Result<Option<Tenant>, ProofGateError> {
        self.with_conn("tenants.get", |conn| tenant_by_id_in(conn, id))
    }

    /// Remove a tenant together with its leads, deliveries, and DNC entries.
    pub fn remove_tenant(&self, id: &str) -> Result<bool, ProofGateError> {
        self.with_conn("tenants.remove", |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM leads WHERE tenant_id = ?1", params![id])?;
            tx.execute("DELETE FROM webhook_events WHERE tenant_id = ?1", params![id])?;
            tx.execute("DELETE FROM do_not_call WHERE tenant_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM tenants WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    pub fn grant_role(&self, user_id: &str, role: Role) -> Result<(), ProofGateError> {
        self.with_conn("roles.grant", |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_roles(user_id, role, created_at) VALUES(?1, ?2, ?3)",
                params![user_id, role.to_string(), time::now_epoch_z()],
            )?;
            Ok(())
        })
    }

    pub fn revoke_role(&self, user_id: &str, role: Role) -> Result<bool, ProofGateError> {
        self.with_conn("roles.revoke", |conn| {
            let n = conn.execute(
                "DELETE FROM user_roles WHERE user_id = ?1 AND role = ?2",
                params![user_id, role.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    /// Mint a bearer token for `user_id`. Only the hash is kept.
    pub fn issue_token(&self, user_id: &str) -> Result<String, ProofGateError> {
        let token = format!("pgt_{}", Uuid::new_v4().simple());
        self.with_conn("tokens.issue", |conn| {
            conn.execute(
                "INSERT INTO access_tokens(token_hash, user_id, created_at) VALUES(?1, ?2, ?3)",
                params![hash_secret(&token), user_id, time::now_epoch_z()],
            )?;
            Ok(())
        })?;
        Ok(token)
    }

    /// Resolve a bearer token to the caller's role context; `None` for an
    /// unknown token.
    pub fn resolve_token(&self, token: &str) -> Result<Option<RoleContext>, ProofGateError> {
        self.with_conn("tokens.resolve", |conn| {
            let Some(user_id) = user_for_token_in(conn, token)? else {
                return Ok(None);
            };
            let roles = roles_in(conn, &user_id)?;
            Ok(Some(RoleContext::signed_in(&user_id, &roles)))
        })
    }

    /// Role context of a local user, from their `user_roles` rows.
    pub fn role_context(&self, user_id: &str) -> Result<RoleContext, ProofGateError> {
        let roles = self.with_conn("roles.list", |conn| roles_in(conn, user_id))?;
        Ok(RoleContext::signed_in(user_id, &roles))
    }

    pub fn add_do_not_call(&self, tenant_id: &str, phone: &str) -> Result<(), ProofGateError> {
        let digits = crate::plugins::webhook::phone_digits(phone);
        if digits.is_empty() {
            return Err(ProofGateError::ValidationError(format!(
                "not a phone number: {}",
                phone
            )));
        }
        self.with_conn("dnc.add", |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO do_not_call(tenant_id, phone, created_at) VALUES(?1, ?2, ?3)",
                params![tenant_id, digits, time::now_epoch_z()],
            )?;
            Ok(())
        })
    }
}
