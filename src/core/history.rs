//! Claim log and persisted gate runs.
//!
//! The contradiction detector reads both: claims are statements someone made
//! about the tree ("src/pages/Admin.tsx exists"), runs are what earlier gates
//! actually observed.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::ProofGateError;
use crate::core::evidence::EvidencePack;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub subject: String,
    pub asserted_present: bool,
    pub provenance: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorRun {
    pub run_id: String,
    pub ts: String,
    pub proof_token: String,
    pub ok: bool,
    pub build_sha256: Option<String>,
    pub all_imports_ok: Option<bool>,
}

pub trait RunHistory {
    fn claims(&self) -> Result<Vec<Claim>, ProofGateError>;
    fn latest_run(&self) -> Result<Option<PriorRun>, ProofGateError>;
    /// Persist a sealed pack. Returns the new run id.
    fn record_run(&self, pack: &EvidencePack) -> Result<String, ProofGateError>;
}

fn prior_run_from(run_id: String, pack: &EvidencePack) -> PriorRun {
    PriorRun {
        run_id,
        ts: pack.timestamp.clone(),
        proof_token: pack.proof_token.clone().unwrap_or_default(),
        ok: pack.validation_result.as_ref().is_some_and(|v| v.ok),
        build_sha256: pack
            .build_output
            .as_ref()
            .and_then(|b| b.meta.sha256.clone()),
        all_imports_ok: pack.fs_reality_check.as_ref().map(|f| f.all_imports_ok),
    }
}

pub struct SqliteRunHistory {
    root: PathBuf,
}

impl SqliteRunHistory {
    pub fn new(store: &Store) -> Self {
        Self {
            root: store.root.clone(),
        }
    }

    fn broker(&self) -> (DbBroker, PathBuf) {
        (DbBroker::new(&self.root), db::proofgate_db_path(&self.root))
    }

    pub fn add_claim(
        &self,
        subject: &str,
        asserted_present: bool,
        provenance: &str,
    ) -> Result<Claim, ProofGateError> {
        let (broker, db_path) = self.broker();
        let claim = Claim {
            id: Ulid::new().to_string(),
            subject: subject.to_string(),
            asserted_present,
            provenance: provenance.to_string(),
            created_at: time::now_epoch_z(),
        };
        broker.with_conn(&db_path, "proofgate", None, "claims.add", |conn| {
            conn.execute(
                "INSERT INTO claims(id, subject, asserted_present, provenance, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    claim.id,
                    claim.subject,
                    claim.asserted_present,
                    claim.provenance,
                    claim.created_at
                ],
            )?;
            Ok(())
        })?;
        Ok(claim)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<PriorRun>, ProofGateError> {
        let (broker, db_path) = self.broker();
        broker.with_conn(&db_path, "proofgate", None, "runs.recent", |conn| {
            let mut stmt = conn.prepare(
                "SELECT run_id, ts, proof_token, ok, build_sha256, all_imports_ok
                 FROM gate_runs ORDER BY ts DESC, run_id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(PriorRun {
                    run_id: row.get(0)?,
                    ts: row.get(1)?,
                    proof_token: row.get(2)?,
                    ok: row.get(3)?,
                    build_sha256: row.get(4)?,
                    all_imports_ok: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Load a stored pack by run id or proof token.
    pub fn load_pack(&self, key: &str) -> Result<EvidencePack, ProofGateError> {
        let (broker, db_path) = self.broker();
        let json: Option<String> = broker.with_conn(&db_path, "proofgate", None, "runs.load", |conn| {
            Ok(conn
                .query_row(
                    "SELECT pack_json FROM gate_runs WHERE run_id = ?1 OR proof_token = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        let json = json.ok_or_else(|| ProofGateError::NotFound(format!("gate run {}", key)))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn latest_pack(&self) -> Result<Option<EvidencePack>, ProofGateError> {
        match self.latest_run()? {
            Some(run) => Ok(Some(self.load_pack(&run.run_id)?)),
            None => Ok(None),
        }
    }
}

impl RunHistory for SqliteRunHistory {
    fn claims(&self) -> Result<Vec<Claim>, ProofGateError> {
        let (broker, db_path) = self.broker();
        broker.with_conn(&db_path, "proofgate", None, "claims.list", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject, asserted_present, provenance, created_at FROM claims ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Claim {
                    id: row.get(0)?,
                    subject: row.get(1)?,
                    asserted_present: row.get(2)?,
                    provenance: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn latest_run(&self) -> Result<Option<PriorRun>, ProofGateError> {
        Ok(self.recent_runs(1)?.into_iter().next())
    }

    fn record_run(&self, pack: &EvidencePack) -> Result<String, ProofGateError> {
        let (broker, db_path) = self.broker();
        let run = prior_run_from(Ulid::new().to_string(), pack);
        let pack_json = serde_json::to_string(pack)?;
        broker.with_conn(&db_path, "proofgate", None, "runs.record", |conn| {
            conn.execute(
                "INSERT INTO gate_runs(run_id, ts, proof_token, ok, build_sha256, all_imports_ok, pack_json)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.run_id,
                    run.ts,
                    run.proof_token,
                    run.ok,
                    run.build_sha256,
                    run.all_imports_ok,
                    pack_json
                ],
            )?;
            Ok(())
        })?;
        Ok(run.run_id)
    }
}

/// In-memory history for tests.
#[derive(Default)]
pub struct MemoryRunHistory {
    pub claims: Vec<Claim>,
    runs: Mutex<Vec<PriorRun>>,
}

impl MemoryRunHistory {
    pub fn with_claims(claims: Vec<Claim>) -> Self {
        Self {
            claims,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_prior(mut self, run: PriorRun) -> Self {
        self.runs.get_mut().unwrap_or_else(|p| p.into_inner()).push(run);
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl RunHistory for MemoryRunHistory {
    fn claims(&self) -> Result<Vec<Claim>, ProofGateError> {
        Ok(self.claims.clone())
    }

    fn latest_run(&self) -> Result<Option<PriorRun>, ProofGateError> {
        Ok(self
            .runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last()
            .cloned())
    }

    fn record_run(&self, pack: &EvidencePack) -> Result<String, ProofGateError> {
        let run = prior_run_from(Ulid::new().to_string(), pack);
        let id = run.run_id.clone();
        self.runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(run);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evidence::{BuildMeta, BuildOutput, FsRealityCheck};
    use tempfile::tempdir;

    fn pack(ts: &str, token: &str) -> EvidencePack {
        let mut pack = EvidencePack::new(ts, "/admin");
        pack.proof_token = Some(token.to_string());
        pack.build_output = Some(BuildOutput {
            present: true,
            text: String::new(),
            meta: BuildMeta {
                sha256: Some("abc".to_string()),
                ..BuildMeta::default()
            },
        });
        pack.fs_reality_check = Some(FsRealityCheck {
            all_imports_ok: true,
            ..FsRealityCheck::default()
        });
        pack
    }

    #[test]
    fn claims_round_trip() {
        let tmp = tempdir().unwrap();
        db::initialize_db(tmp.path()).unwrap();
        let history = SqliteRunHistory::new(&Store::scratch(tmp.path()));
        history
            .add_claim("src/pages/Admin.tsx", true, "release notes")
            .unwrap();
        let claims = history.claims().unwrap();
        assert_eq!(claims.len(), 1);
        assert!(claims[0].asserted_present);
        assert_eq!(claims[0].subject, "src/pages/Admin.tsx");
    }

    #[test]
    fn latest_run_is_most_recent_and_pack_reloads() {
        let tmp = tempdir().unwrap();
        db::initialize_db(tmp.path()).unwrap();
        let history = SqliteRunHistory::new(&Store::scratch(tmp.path()));
        assert!(history.latest_run().unwrap().is_none());

        history
            .record_run(&pack("2026-03-01T10:00:00.000Z", "pg_first"))
            .unwrap();
        let second = history
            .record_run(&pack("2026-03-01T11:00:00.000Z", "pg_second"))
            .unwrap();

        let latest = history.latest_run().unwrap().unwrap();
        assert_eq!(latest.run_id, second);
        assert_eq!(latest.build_sha256.as_deref(), Some("abc"));
        assert_eq!(latest.all_imports_ok, Some(true));

        let reloaded = history.load_pack("pg_first").unwrap();
        assert_eq!(reloaded.timestamp, "2026-03-01T10:00:00.000Z");
        assert!(matches!(
            history.load_pack("nope"),
            Err(ProofGateError::NotFound(_))
        ));
    }
}
