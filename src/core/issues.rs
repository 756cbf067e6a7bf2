//! Recurring issue counters.
//!
//! A durable count per issue code that survives across gate runs. Counts only
//! go up; the sole way down is an explicit [`IssueLedger::reset`]. The
//! orchestrator receives a ledger rather than reaching for global state, so
//! each test can hand in a fresh one.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::ProofGateError;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub type IssueCounts = BTreeMap<String, u64>;

pub trait IssueLedger {
    fn load(&self) -> Result<IssueCounts, ProofGateError>;

    /// Add `deltas` to the stored counts atomically and return the new totals
    /// for the touched codes.
    fn increment(&self, deltas: &IssueCounts) -> Result<IssueCounts, ProofGateError>;

    /// Zero one code, or all codes when `code` is `None`. Returns rows removed.
    fn reset(&self, code: Option<&str>) -> Result<usize, ProofGateError>;
}

/// What changed between the counts loaded at run start and the run's counts.
pub fn deltas(baseline: &IssueCounts, current: &IssueCounts) -> IssueCounts {
    current
        .iter()
        .filter_map(|(code, &count)| {
            let before = baseline.get(code).copied().unwrap_or(0);
            (count > before).then(|| (code.clone(), count - before))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueRow {
    pub code: String,
    pub count: u64,
    pub first_seen: String,
    pub last_seen: String,
}

pub struct SqliteIssueLedger {
    root: PathBuf,
}

impl SqliteIssueLedger {
    pub fn new(store: &Store) -> Self {
        Self {
            root: store.root.clone(),
        }
    }

    pub fn rows(&self) -> Result<Vec<IssueRow>, ProofGateError> {
        let broker = DbBroker::new(&self.root);
        broker.with_conn(
            &db::proofgate_db_path(&self.root),
            "proofgate",
            None,
            "issues.list",
            |conn| {
                let mut stmt = conn.prepare(
                    "SELECT code, count, first_seen, last_seen FROM recurring_issues ORDER BY count DESC, code",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(IssueRow {
                        code: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                        first_seen: row.get(2)?,
                        last_seen: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            },
        )
    }
}

impl IssueLedger for SqliteIssueLedger {
    fn load(&self) -> Result<IssueCounts, ProofGateError> {
        Ok(self
            .rows()?
            .into_iter()
            .map(|r| (r.code, r.count))
            .collect())
    }

    fn increment(&self, deltas: &IssueCounts) -> Result<IssueCounts, ProofGateError> {
        if deltas.is_empty() {
            return Ok(IssueCounts::new());
        }
        let broker = DbBroker::new(&self.root);
        let now = time::now_epoch_z();
        broker.with_conn(
            &db::proofgate_db_path(&self.root),
            "proofgate",
            None,
            "issues.increment",
            |conn| {
                let tx = conn.unchecked_transaction()?;
                let mut totals = IssueCounts::new();
                for (code, delta) in deltas {
                    tx.execute(
                        "INSERT INTO recurring_issues(code, count, first_seen, last_seen) VALUES(?1, ?2, ?3, ?3)
                         ON CONFLICT(code) DO UPDATE SET count = count + excluded.count, last_seen = excluded.last_seen",
                        params![code, *delta as i64, now],
                    )?;
                    let total: i64 = tx.query_row(
                        "SELECT count FROM recurring_issues WHERE code = ?1",
                        params![code],
                        |row| row.get(0),
                    )?;
                    totals.insert(code.clone(), total.max(0) as u64);
                }
                tx.commit()?;
                Ok(totals)
            },
        )
    }

    fn reset(&self, code: Option<&str>) -> Result<usize, ProofGateError> {
        let broker = DbBroker::new(&self.root);
        broker.with_conn(
            &db::proofgate_db_path(&self.root),
            "proofgate",
            None,
            "issues.reset",
            |conn| {
                let removed = match code {
                    Some(c) => {
                        conn.execute("DELETE FROM recurring_issues WHERE code = ?1", params![c])?
                    }
                    None => conn.execute("DELETE FROM recurring_issues", [])?,
                };
                Ok(removed)
            },
        )
    }
}

/// In-memory ledger for tests and scratch runs.
#[derive(Default)]
pub struct MemoryIssueLedger {
    counts: Mutex<IssueCounts>,
}

impl MemoryIssueLedger {
    pub fn with_counts(counts: IssueCounts) -> Self {
        Self {
            counts: Mutex::new(counts),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, IssueCounts> {
        self.counts.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl IssueLedger for MemoryIssueLedger {
    fn load(&self) -> Result<IssueCounts, ProofGateError> {
        Ok(self.guard().clone())
    }

    fn increment(&self, deltas: &IssueCounts) -> Result<IssueCounts, ProofGateError> {
        let mut counts = self.guard();
        let mut totals = IssueCounts::new();
        for (code, delta) in deltas {
            let entry = counts.entry(code.clone()).or_insert(0);
            *entry += delta;
            totals.insert(code.clone(), *entry);
        }
        Ok(totals)
    }

    fn reset(&self, code: Option<&str>) -> Result<usize, ProofGateError> {
        let mut counts = self.guard();
        Ok(match code {
            Some(c) => usize::from(counts.remove(c).is_some()),
            None => {
                let n = counts.len();
                counts.clear();
                n
            }
        })
    }
}
