use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::ProofGateError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::ProofGateError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::ProofGateError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::ProofGateError::RusqliteError)?;
    Ok(conn)
}

pub fn proofgate_db_path(root: &Path) -> PathBuf {
    root.join(schemas::PROOFGATE_DB_NAME)
}

/// Create the store directory and every table. Idempotent.
pub fn initialize_db(root: &Path) -> Result<(), error::ProofGateError> {
    fs::create_dir_all(root).map_err(error::ProofGateError::IoError)?;
    let db_path = proofgate_db_path(root);

    let broker = DbBroker::new(root);
    broker.with_conn(&db_path, "proofgate", None, "db.init", |conn| {
        for stmt in schemas::all_schemas() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    })
}

/// Returns true if `err` is a SQLite UNIQUE / PRIMARY KEY violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
