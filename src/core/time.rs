//! Shared timestamp/event helpers for deterministic envelopes.

use crate::core::error::ProofGateError;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::Path;
use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// RFC 3339 with millisecond precision, always `Z`.
pub fn rfc3339_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate to the containing minute, rendered as RFC 3339.
pub fn minute_bucket(ts: &DateTime<Utc>) -> String {
    let truncated = ts
        .with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(*ts);
    truncated.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Append one JSON line to an event log, creating it if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, event: &T) -> Result<(), ProofGateError> {
    let line = serde_json::to_string(event)?;
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(ProofGateError::IoError)?;
    writeln!(f, "{}", line).map_err(ProofGateError::IoError)?;
    Ok(())
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
