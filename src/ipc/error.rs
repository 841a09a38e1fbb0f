use serde_json::json;
use tracing::debug;

/// Success envelope: `{id, ok: true, result}`.
pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// Failure envelope: `{id, ok: false, error: {code, message, details?}}`.
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let message = message.into();
    debug!(id, code, %message, "request failed");

    let mut error = json!({ "code": code, "message": message });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}
