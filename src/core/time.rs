//! Run identifiers, timestamps and the JSON output envelope.

use serde_json::{Map, Value as JsonValue, json};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Seconds since the epoch; a clock before 1970 reads as 0.
pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Event timestamp form used throughout the store: `1771220592Z`.
pub fn now_epoch_z() -> String {
    format!("{}Z", epoch_seconds())
}

/// Fresh run id for a CI invocation that did not supply one.
pub fn new_run_id() -> String {
    Ulid::new().to_string()
}

/// Wrap a command's payload for `--format json`. Payload keys are merged
/// at the top level; the envelope's own keys win on collision.
pub fn command_envelope(cmd: &str, status: &str, payload: JsonValue) -> JsonValue {
    let mut fields = match payload {
        JsonValue::Object(map) => map,
        JsonValue::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    fields.insert("envelope_version".to_string(), json!(ENVELOPE_VERSION));
    fields.insert("tool".to_string(), json!(env!("CARGO_PKG_NAME")));
    fields.insert("ts".to_string(), json!(now_epoch_z()));
    fields.insert("cmd".to_string(), json!(cmd));
    fields.insert("status".to_string(), json!(status));
    JsonValue::Object(fields)
}
