use proofgate::core::error::ProofGateError;
use proofgate::core::evidence::Severity;
use proofgate::plugins::route_audit::{
    ISSUE_COMPONENT_MISSING, ISSUE_DEAD_LINK, ISSUE_DUPLICATE_PATH, ISSUE_ORPHAN,
    ISSUE_ROLE_MISMATCH, audit, load_registry, parse_registry, path_matches,
};
use std::fs;
use tempfile::tempdir;

const REGISTRY: &str = r#"
[[route]]
path = "/"
label = "Home"
public = true

[[route]]
path = "/leads/:id"
label = "Lead"
component = "src/pages/LeadDetail.tsx"
required_role = "client"

[[route]]
path = "/admin/proof-gate"
label = "Proof Gate"
component = "src/pages/admin/ProofGate.tsx"
required_role = "admin"

[[route]]
path = "/admin/proof-gate"
label = "Proof Gate (old)"

[[route]]
path = "/settings"
label = "Settings"
required_role = "owner"

[[nav]]
label = "Home"
path = "/"

[[nav]]
label = "Proof Gate"
path = "/admin/proof-gate"

[[nav]]
label = "Latest lead"
path = "/leads/42?tab=notes"
roles = ["client"]

[[nav]]
label = "Billing"
path = "/billing"
roles = ["owner"]
"#;

#[test]
fn realistic_registry_yields_each_finding_class() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("src/pages")).unwrap();
    fs::write(tmp.path().join("src/pages/LeadDetail.tsx"), "export {}\n").unwrap();

    let registry = parse_registry(REGISTRY).unwrap();
    let report = audit(&registry, tmp.path());

    let codes: Vec<&str> = report.findings.iter().map(|f| f.code.as_str()).collect();
    assert!(codes.contains(&ISSUE_DUPLICATE_PATH));
    assert!(codes.contains(&ISSUE_COMPONENT_MISSING));
    assert!(codes.contains(&ISSUE_DEAD_LINK));
    // "Proof Gate" nav has no role filter but the route is admin-only.
    assert!(codes.contains(&ISSUE_ROLE_MISMATCH));
    // /settings is private and nothing links to it.
    let orphans: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.code == ISSUE_ORPHAN)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(orphans, vec!["/settings"]);

    assert_eq!(report.summary.critical, 3);
    assert_eq!(report.summary.warning, 2);
    assert!(
        report
            .findings
            .iter()
            .filter(|f| f.code == ISSUE_DEAD_LINK)
            .all(|f| f.severity == Severity::Critical && f.path == "/billing")
    );
}

#[test]
fn clean_registry_passes_everything() {
    let tmp = tempdir().unwrap();
    let registry = parse_registry(
        r#"
        [[route]]
        path = "/"
        label = "Home"
        public = true

        [[route]]
        path = "/dashboard"
        label = "Dashboard"
        required_role = "client"

        [[nav]]
        label = "Dashboard"
        path = "/dashboard/"
        roles = ["client", "admin"]
        "#,
    )
    .unwrap();
    let report = audit(&registry, tmp.path());
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.summary.passed, 3);
}

#[test]
fn params_queries_and_fragments() {
    assert!(path_matches("/leads/:id", "/leads/42"));
    assert!(path_matches("/leads/:id", "/leads/42#history"));
    assert!(!path_matches("/leads/:id", "/leads"));
    assert!(!path_matches("/leads/:id", "/leads/42/edit"));
    assert!(path_matches("/", "/?utm=x"));
}

#[test]
fn missing_or_malformed_registry_is_a_config_problem() {
    let tmp = tempdir().unwrap();
    let missing = load_registry(&tmp.path().join("routes.toml")).unwrap_err();
    assert!(matches!(missing, ProofGateError::ConfigError(_)));

    fs::write(tmp.path().join("routes.toml"), "[[route]\npath = 1").unwrap();
    let malformed = load_registry(&tmp.path().join("routes.toml")).unwrap_err();
    assert!(matches!(malformed, ProofGateError::TomlError(_)));
}
