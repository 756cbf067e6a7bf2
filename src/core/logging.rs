//! Diagnostic logging setup.
//!
//! Audit trails are JSONL files written through the broker and the gate;
//! this module only wires `tracing` output for humans and log collectors.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const ENV_LOG: &str = "PROOFGATE_LOG";
pub const ENV_LOG_JSON: &str = "PROOFGATE_LOG_JSON";

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

/// Install the global subscriber with `default_directive` unless
/// `PROOFGATE_LOG` says otherwise. Later calls are ignored.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if env_bool(ENV_LOG_JSON, false) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    let _ = result;
}
