use proofgate::core::assets;
use proofgate::core::broker::{BrokerEvent, DbBroker};
use proofgate::core::config;
use proofgate::core::db;
use proofgate::core::error::ProofGateError;
use proofgate::core::evidence::{self, EvidencePack, HumanAction};
use proofgate::core::issues::{IssueCounts, IssueLedger, SqliteIssueLedger};
use proofgate::core::scaffold::{self, ScaffoldOptions};
use proofgate::core::schemas;
use proofgate::core::store::{Store, StoreKind};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

#[test]
fn templates_resolve_and_scaffold_loads_back() {
    for name in assets::list_templates() {
        let content = assets::get_template(name).expect("listed template should resolve");
        assert!(!content.trim().is_empty());
    }

    let tmp = tempdir().expect("tempdir");
    scaffold::scaffold_project(&ScaffoldOptions {
        target_dir: tmp.path().to_path_buf(),
        force: false,
        dry_run: false,
    })
    .expect("scaffold");

    let loaded = config::load_config(tmp.path()).expect("load config");
    assert_eq!(loaded.gate.routes_file, ".proofgate/routes.toml");
    assert_eq!(loaded.backend.sign_endpoint, "proof-sign");
    assert!(
        fs::read_to_string(tmp.path().join(".proofgate/.gitignore"))
            .unwrap()
            .contains("data/")
    );
}

#[test]
fn db_init_creates_every_table_with_pragmas() {
    let tmp = tempdir().expect("tempdir");
    db::initialize_db(tmp.path()).expect("init");
    db::initialize_db(tmp.path()).expect("init is idempotent");

    let conn = db::db_connect(&db::proofgate_db_path(tmp.path()).to_string_lossy()).unwrap();
    let fk_on: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fk_on, 1);
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");

    for table in [
        "recurring_issues",
        "claims",
        "gate_runs",
        "tenants",
        "user_roles",
        "access_tokens",
        "leads",
        "webhook_events",
        "do_not_call",
    ] {
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 1, "missing table {}", table);
    }
    assert_eq!(schemas::PROOFGATE_DB_NAME, "proofgate.db");
}

#[test]
fn broker_audits_every_operation() {
    let tmp = tempdir().expect("tempdir");
    let broker = DbBroker::new(tmp.path());
    let db_path = tmp.path().join("audit.db");

    broker
        .with_conn(&db_path, "tester", Some("intent-1"), "t.create", |conn| {
            conn.execute("CREATE TABLE t(x INTEGER)", [])?;
            Ok(())
        })
        .unwrap();
    let err = broker
        .with_conn(&db_path, "tester", None, "t.fail", |_| -> Result<(), _> {
            Err(ProofGateError::ValidationError("nope".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, ProofGateError::ValidationError(_)));

    let log = fs::read_to_string(tmp.path().join("broker.events.jsonl")).unwrap();
    let events: Vec<BrokerEvent> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].op, "t.create");
    assert_eq!(events[0].intent_ref.as_deref(), Some("intent-1"));
    assert_eq!(events[0].status, "success");
    assert_eq!(events[1].status, "error");
    assert_eq!(events[1].db_id, "audit.db");
}

#[test]
fn concurrent_increments_are_not_lost() {
    let tmp = tempdir().expect("tempdir");
    db::initialize_db(tmp.path()).unwrap();
    let store = Store::scratch(tmp.path());
    assert_eq!(store.kind, StoreKind::Scratch);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let store = store.clone();
            thread::spawn(move || {
                let ledger = SqliteIssueLedger::new(&store);
                let deltas: IssueCounts = [("nav_dead_link".to_string(), 1)].into_iter().collect();
                barrier.wait();
                ledger.increment(&deltas).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let ledger = SqliteIssueLedger::new(&store);
    assert_eq!(ledger.load().unwrap().get("nav_dead_link"), Some(&8));
    assert_eq!(ledger.reset(Some("nav_dead_link")).unwrap(), 1);
    assert!(ledger.load().unwrap().is_empty());
}

#[test]
fn proof_token_tracks_content_not_verdict() {
    let mut pack = EvidencePack::new("2026-03-01T10:15:02.000Z", "/dashboard");
    pack.push_action(HumanAction::new("Run the build and capture output", "build_output", ""));
    let token = evidence::compute_proof_token(&pack).unwrap();
    assert!(token.starts_with(evidence::PROOF_TOKEN_PREFIX));
    assert_eq!(token, evidence::compute_proof_token(&pack).unwrap());

    let mut moved = pack.clone();
    moved.current_route = "/admin".to_string();
    assert_ne!(token, evidence::compute_proof_token(&moved).unwrap());

    let assigned = evidence::assign_proof_token(&mut pack).unwrap();
    assert_eq!(assigned, token);
    assert_eq!(evidence::compute_proof_token(&pack).unwrap(), token);
}
