//! Response envelope decoding and error classification.

use crate::error::{ApiError, ApiResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Standard response envelope: `{ success, data, error }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Payload.
    pub data: Option<T>,
    /// Error detail.
    pub error: Option<Value>,
}

/// Decode the envelope's `data` from a successful body.
pub(crate) fn decode_data<T: DeserializeOwned>(status: u16, body: &[u8]) -> ApiResult<T> {
    let envelope: Envelope<T> = decode_raw(status, body)?;
    if !envelope.success {
        let message = envelope
            .error
            .as_ref()
            .and_then(message_from_error_value)
            .unwrap_or_else(|| "request was not successful".to_string());
        return Err(ApiError::server(status, message));
    }
    envelope
        .data
        .ok_or_else(|| ApiError::server(status, "response envelope has no data"))
}

/// Decode a body as-is.
pub(crate) fn decode_raw<T: DeserializeOwned>(status: u16, body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::server(status, format!("invalid response body: {e}")))
}

/// Classify a non-success response.
///
/// `had_bearer` says whether the attempt carried an access token; a 401 on an
/// anonymous request means there is no session rather than an expired one.
pub fn classify_failure(status: u16, body: &[u8], had_bearer: bool, replayed: bool) -> ApiError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| default_message(status));

    if status == 401 {
        return if replayed || had_bearer {
            ApiError::session_expired(message)
        } else {
            ApiError::unauthenticated(message)
        };
    }

    if (400..500).contains(&status) {
        let fields = parsed.as_ref().map(extract_fields).unwrap_or_default();
        if !fields.is_empty() {
            return ApiError::validation(status, message, fields);
        }
    }

    ApiError::server(status, message)
}

fn default_message(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn extract_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(message_from_error_value)
        .or_else(|| body.get("message").and_then(Value::as_str).map(str::to_string))
}

fn message_from_error_value(error: &Value) -> Option<String> {
    match error {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Field errors may appear as `error.fields`, a top-level `errors` map, or an
/// `error.details` list of `{ field, message }`.
fn extract_fields(body: &Value) -> BTreeMap<String, Vec<String>> {
    let mut fields = BTreeMap::new();

    let maps = [
        body.get("error").and_then(|e| e.get("fields")),
        body.get("errors"),
    ];
    for map in maps.into_iter().flatten() {
        if let Value::Object(obj) = map {
            for (name, value) in obj {
                let messages = match value {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    _ => continue,
                };
                if !messages.is_empty() {
                    fields
                        .entry(name.clone())
                        .or_insert_with(Vec::new)
                        .extend(messages);
                }
            }
        }
    }

    if let Some(Value::Array(details)) = body.get("error").and_then(|e| e.get("details")) {
        for detail in details {
            let field = detail.get("field").and_then(Value::as_str);
            let message = detail.get("message").and_then(Value::as_str);
            if let (Some(field), Some(message)) = (field, message) {
                fields
                    .entry(field.to_string())
                    .or_insert_with(Vec::new)
                    .push(message.to_string());
            }
        }
    }

    fields
}
