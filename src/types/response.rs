use serde_json::Value;

use crate::error::SessionError;

const SUCCESS_CODES: [i64; 2] = [0, 200];

/// Unwraps the backend response envelope `{code, message, data}`.
///
/// A non-success `code` becomes [`SessionError::Api`]. When a `data` member is
/// present it is the payload; otherwise the body itself is, so bare payloads
/// pass through unchanged.
pub(crate) fn unwrap_envelope(mut value: Value) -> Result<Value, SessionError> {
    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if !SUCCESS_CODES.contains(&code) {
            let message = value
                .get("message")
                .or_else(|| value.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SessionError::Api { code, message });
        }
    }

    match value.get_mut("data") {
        Some(data) if !data.is_null() => Ok(data.take()),
        _ => Ok(value),
    }
}
