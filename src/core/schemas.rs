//! Centralized database schema definitions.
//!
//! proofgate keeps all state in a single SQLite database (`proofgate.db`):
//! 1. Gate state: recurring issue counters, the claim log, persisted gate runs.
//! 2. Tenancy: tenants, user roles, access tokens.
//! 3. Leads: leads, webhook deliveries, the do-not-call list.

pub const PROOFGATE_DB_NAME: &str = "proofgate.db";

// --- 1. Gate state ---

pub const GATE_DB_SCHEMA_ISSUES: &str = "
    CREATE TABLE IF NOT EXISTS recurring_issues (
        code TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL
    )
";

pub const GATE_DB_SCHEMA_CLAIMS: &str = "
    CREATE TABLE IF NOT EXISTS claims (
        id TEXT PRIMARY KEY,
        subject TEXT NOT NULL,
        asserted_present INTEGER NOT NULL,
        provenance TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
";

pub const GATE_DB_SCHEMA_RUNS: &str = "
    CREATE TABLE IF NOT EXISTS gate_runs (
        run_id TEXT PRIMARY KEY,
        ts TEXT NOT NULL,
        proof_token TEXT NOT NULL,
        ok INTEGER NOT NULL,
        build_sha256 TEXT,
        all_imports_ok INTEGER,
        pack_json TEXT NOT NULL
    )
";
pub const GATE_DB_SCHEMA_RUNS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_gate_runs_ts ON gate_runs(ts)";

// --- 2. Tenancy ---

pub const TENANCY_DB_SCHEMA_TENANTS: &str = "
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        api_key_hash TEXT UNIQUE,
        created_at TEXT NOT NULL
    )
";

pub const TENANCY_DB_SCHEMA_USER_ROLES: &str = "
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY(user_id, role)
    )
";

pub const TENANCY_DB_SCHEMA_ACCESS_TOKENS: &str = "
    CREATE TABLE IF NOT EXISTS access_tokens (
        token_hash TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

// --- 3. Leads ---

pub const LEADS_DB_SCHEMA_LEADS: &str = "
    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        tenant_id TEXT,
        name TEXT NOT NULL DEFAULT '',
        email TEXT,
        phone TEXT,
        source TEXT NOT NULL,
        qa_nonce TEXT,
        dedupe_key TEXT NOT NULL,
        do_not_call INTEGER NOT NULL DEFAULT 0,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(tenant_id, dedupe_key),
        FOREIGN KEY(tenant_id) REFERENCES tenants(id)
    )
";
pub const LEADS_DB_SCHEMA_LEADS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_leads_tenant ON leads(tenant_id)";

pub const LEADS_DB_SCHEMA_WEBHOOK_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS webhook_events (
        id TEXT PRIMARY KEY,
        tenant_id TEXT,
        status TEXT NOT NULL,
        lead_id TEXT,
        payload TEXT NOT NULL,
        received_at TEXT NOT NULL
    )
";

pub const LEADS_DB_SCHEMA_DO_NOT_CALL: &str = "
    CREATE TABLE IF NOT EXISTS do_not_call (
        tenant_id TEXT NOT NULL,
        phone TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY(tenant_id, phone)
    )
";

/// Every schema statement, in creation order.
pub fn all_schemas() -> [&'static str; 11] {
    [
        GATE_DB_SCHEMA_ISSUES,
        GATE_DB_SCHEMA_CLAIMS,
        GATE_DB_SCHEMA_RUNS,
        GATE_DB_SCHEMA_RUNS_INDEX,
        TENANCY_DB_SCHEMA_TENANTS,
        TENANCY_DB_SCHEMA_USER_ROLES,
        TENANCY_DB_SCHEMA_ACCESS_TOKENS,
        LEADS_DB_SCHEMA_LEADS,
        LEADS_DB_SCHEMA_LEADS_INDEX,
        LEADS_DB_SCHEMA_WEBHOOK_EVENTS,
        LEADS_DB_SCHEMA_DO_NOT_CALL,
    ]
}
