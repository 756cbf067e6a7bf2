use proofgate::core::assets;
use proofgate::core::backend::Backend;
use proofgate::core::config::ProofGateConfig;
use proofgate::core::db;
use proofgate::core::error::ProofGateError;
use proofgate::core::gate::{ProofGate, RemoteSigner};
use proofgate::core::history::{RunHistory, SqliteRunHistory};
use proofgate::core::identity::{Role, RoleContext};
use proofgate::core::issues::{IssueLedger, SqliteIssueLedger};
use proofgate::core::scaffold;
use proofgate::core::store::Store;
use proofgate::core::validate;
use proofgate::plugins::standard_plan;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const TENANT: &str = "0b1c2d3e-4f50-4a61-8b72-9c8d7e6f5a4b";

/// A backend whose every endpoint answers healthy.
struct HealthyBackend;

impl Backend for HealthyBackend {
    fn rpc(&self, procedure: &str, _args: &Value) -> Result<Value, ProofGateError> {
        match procedure {
            "qa_dependency_check" => Ok(json!([{ "ok": true, "suspect_count": 0, "suspects": [] }])),
            other => Err(ProofGateError::TransportError(format!("unexpected rpc {}", other))),
        }
    }

    fn invoke_function(&self, name: &str, body: &Value) -> Result<Value, ProofGateError> {
        match name {
            "edge-preflight" => Ok(json!({ "report": { "ok": true, "suspect_count": 0 } })),
            "proof-sign" => Ok(json!({
                "signature": format!("sig:{}", body["proof_token"].as_str().unwrap_or_default()),
                "algorithm": "ed25519",
                "key_id": "k1",
            })),
            other => Err(ProofGateError::TransportError(format!("unexpected function {}", other))),
        }
    }

    fn select(&self, table: &str, _query: &[(&str, String)]) -> Result<Vec<Value>, ProofGateError> {
        match table {
            "tenants" => Ok(vec![json!({ "id": TENANT })]),
            "edge_console_runs" => Ok(vec![json!({
                "function_name": "lead-webhook",
                "created_at": "2026-03-01T10:14:00Z",
                "error_count": 0,
                "warning_count": 1,
            })]),
            other => Err(ProofGateError::TransportError(format!("unexpected table {}", other))),
        }
    }
}

struct Project {
    _tmp: TempDir,
    config: ProofGateConfig,
    store: Store,
}

impl Project {
    fn root(&self) -> &Path {
        self._tmp.path()
    }
}

fn green_project() -> Project {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path();
    fs::create_dir_all(root.join(".proofgate")).unwrap();
    fs::write(root.join(".proofgate/routes.toml"), assets::TEMPLATE_ROUTES).unwrap();
    fs::write(
        root.join(".proofgate/build-output.txt"),
        "vite v5.2.0 building for production...\n✓ 812 modules transformed.\nbuilt in 4.1s\n",
    )
    .unwrap();
    fs::create_dir_all(root.join("src/pages")).unwrap();
    fs::write(root.join("src/pages/Admin.tsx"), "export default function Admin() {}\n").unwrap();

    let data = scaffold::data_dir(root);
    db::initialize_db(&data).unwrap();

    let mut config = ProofGateConfig::default();
    config.backend.url = Some("https://backend.test".to_string());
    config.gate.import_paths = vec!["src/pages/Admin.tsx".to_string()];
    Project {
        _tmp: tmp,
        config,
        store: Store::project(&data),
    }
}

fn admin() -> RoleContext {
    RoleContext::signed_in("user-0001-admin", &[Role::Admin])
}

#[test]
fn all_green_run_is_signed_sealed_and_recorded() {
    let project = green_project();
    let backend = HealthyBackend;
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    let signer = RemoteSigner::new(&backend, &project.config.backend.sign_endpoint);
    let events = project.store.events_path("gate");

    let finalized = ProofGate::new(
        project.root(),
        &project.config,
        &backend,
        &ledger,
        &history,
        standard_plan(),
    )
    .with_signer(&signer)
    .with_event_log(events.clone())
    .run(&admin(), "/dashboard")
    .expect("gate run");

    assert!(finalized.is_ok(), "{:#?}", finalized.report());
    assert!(finalized.proof_token().starts_with("pg_"));
    let pack = finalized.pack();
    assert!(pack.is_sealed());
    assert_eq!(pack.runs.len(), 9);
    assert!(pack.aborted_at.is_none());
    let kernel = pack.proof_kernel.as_ref().unwrap();
    assert_eq!(
        kernel.signature.as_ref().unwrap().value,
        format!("sig:{}", finalized.proof_token())
    );
    assert!(
        !finalized
            .report()
            .warnings
            .iter()
            .any(|w| w.contains("unsigned"))
    );

    let runs = history.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].ok);
    assert_eq!(runs[0].run_id, finalized.run_id());

    // The stored pack re-validates to the same verdict.
    let stored = history.load_pack(finalized.proof_token()).unwrap();
    assert_eq!(&stored, pack);
    assert!(validate::validate_stored(&stored).unwrap().ok);

    let log = fs::read_to_string(&events).unwrap();
    assert_eq!(log.lines().count(), 1);
    let event: Value = serde_json::from_str(log.trim()).unwrap();
    assert_eq!(event["ok"], true);
    assert_eq!(event["signed"], true);
}

#[test]
fn false_claim_aborts_the_sequence_but_still_seals() {
    let project = green_project();
    let backend = HealthyBackend;
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    history
        .add_claim("src/pages/Billing.tsx", true, "release notes")
        .unwrap();

    let finalized = ProofGate::new(
        project.root(),
        &project.config,
        &backend,
        &ledger,
        &history,
        standard_plan(),
    )
    .run(&admin(), "/")
    .unwrap();

    assert!(!finalized.is_ok());
    let pack = finalized.pack();
    assert_eq!(pack.aborted_at.as_deref(), Some("contradiction"));
    let ids: Vec<_> = pack.runs.iter().map(|r| r.tool_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["access", "fs_reality", "build_output", "contradiction"]
    );
    assert!(pack.is_sealed());
    assert!(
        finalized
            .report()
            .errors
            .iter()
            .any(|e| e.contains("contradiction"))
    );

    let aborted = pack.runs.last().unwrap();
    assert!(!aborted.ok);
    assert_eq!(aborted.status.as_deref(), Some("fail"));
    assert_eq!(aborted.error, aborted.detail);
    assert!(aborted.error.is_some());
    let kernel_log = &pack.proof_kernel.as_ref().unwrap().run_log;
    assert!(!kernel_log.last().unwrap().ok);

    assert_eq!(ledger.load().unwrap().get("proof_contradiction"), Some(&1));
    assert!(!history.latest_run().unwrap().unwrap().ok);
}

#[test]
fn edited_stored_pack_no_longer_validates() {
    let mut project = green_project();
    project.config.gate.import_paths = vec!["src/pages/Missing.tsx".to_string()];
    let backend = HealthyBackend;
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    let finalized = ProofGate::new(
        project.root(),
        &project.config,
        &backend,
        &ledger,
        &history,
        standard_plan(),
    )
    .run(&admin(), "/")
    .unwrap();
    assert!(!finalized.is_ok());

    // Flip the failing check to green without re-running the gate.
    let mut edited = history.load_pack(finalized.run_id()).unwrap();
    let fs_check = edited.fs_reality_check.as_mut().unwrap();
    fs_check.all_imports_ok = true;
    fs_check.missing.clear();
    assert!(validate::validate(&edited).ok);

    let report = validate::validate_stored(&edited).unwrap();
    assert!(!report.ok);
    assert!(
        report
            .errors
            .contains(&"proof token does not match pack content".to_string())
    );
    assert!(
        report
            .errors
            .contains(&"content hash does not match pack content".to_string())
    );
}

#[test]
fn recurring_counts_accumulate_across_runs() {
    let mut project = green_project();
    project.config.gate.import_paths = vec!["src/pages/Missing.tsx".to_string()];
    let backend = HealthyBackend;
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    let gate = ProofGate::new(
        project.root(),
        &project.config,
        &backend,
        &ledger,
        &history,
        standard_plan(),
    );

    let first = gate.run(&admin(), "/").unwrap();
    assert!(!first.is_ok());
    let second = gate.run(&admin(), "/").unwrap();

    assert_eq!(
        second.pack().recurring_issue_counts.get("fs_missing_import"),
        Some(&2)
    );
    assert_eq!(ledger.load().unwrap().get("fs_missing_import"), Some(&2));
    assert_ne!(first.proof_token(), second.proof_token());
    assert_eq!(history.recent_runs(10).unwrap().len(), 2);
}

#[test]
fn unreachable_backend_degrades_to_warnings() {
    struct Offline;
    impl Backend for Offline {
        fn rpc(&self, _: &str, _: &Value) -> Result<Value, ProofGateError> {
            Err(ProofGateError::TransportError("connection refused".to_string()))
        }
        fn invoke_function(&self, _: &str, _: &Value) -> Result<Value, ProofGateError> {
            Err(ProofGateError::TransportError("connection refused".to_string()))
        }
        fn select(&self, _: &str, _: &[(&str, String)]) -> Result<Vec<Value>, ProofGateError> {
            Err(ProofGateError::TransportError("connection refused".to_string()))
        }
    }

    let project = green_project();
    let ledger = SqliteIssueLedger::new(&project.store);
    let history = SqliteRunHistory::new(&project.store);
    let signer = RemoteSigner::new(&Offline, "proof-sign");
    let finalized = ProofGate::new(
        project.root(),
        &project.config,
        &Offline,
        &ledger,
        &history,
        standard_plan(),
    )
    .with_signer(&signer)
    .run(&admin(), "/")
    .unwrap();

    // Local evidence is intact, so the verdict holds; remote gaps are advisory.
    assert!(finalized.is_ok(), "{:#?}", finalized.report());
    let warnings = &finalized.report().warnings;
    assert!(warnings.iter().any(|w| w == "evidence pack is unsigned"));
    assert!(warnings.iter().any(|w| w == "db doctor skipped"));
    assert!(warnings.iter().any(|w| w == "edge preflight unreachable"));
    assert_eq!(
        finalized.pack().run_for("db_doctor").unwrap().status.as_deref(),
        Some("skip")
    );
}
