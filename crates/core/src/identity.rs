use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

pub const ORIGINATING_IDENTITY_HEADER: &str = "X-Broker-API-Originating-Identity";

/// Decode `platform base64(JSON)` into `{"platform": .., "value": ..}`.
///
/// Returns `None` for anything malformed; callers treat that as "no identity".
pub fn parse_originating_identity(header: &str) -> Option<Value> {
    let mut parts = header.split_whitespace();
    let platform = parts.next()?;
    let encoded = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let decoded = STANDARD.decode(encoded).ok()?;
    let value: Value = serde_json::from_slice(&decoded).ok()?;
    Some(json!({ "platform": platform, "value": value }))
}

/// The evaluator constant form: an empty object when no identity was sent.
pub fn identity_constant(identity: Option<&Value>) -> Value {
    identity.cloned().unwrap_or_else(|| json!({}))
}
