use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

/// `status` value the gateway sets on a 401 caused by the token itself, as
/// opposed to bad credentials or a malformed request.
const TOKEN_INVALID_STATUS: &str = "token-invalid";

static API_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"API version: ([0-9.]+)").expect("valid literal regex"));

#[derive(Debug, Clone, PartialEq)]
/// Classified gateway reply, ready for the pipeline to act on.
pub(crate) struct RawResponse {
    pub status_code: u16,
    pub body: Value,
    /// Set when the reply is a 401 whose body reports the bearer token as
    /// invalid or expired. Distinct from a generic 401.
    pub token_invalid: bool,
}

/// Decode a wire reply into a [`RawResponse`].
///
/// Some gateway versions answer certain paths with a bare
/// `API version: x.y` plaintext banner instead of JSON; that is tolerated
/// and substituted with `{"api_version": "x.y"}`. An unparseable non-2xx
/// body is replaced by the canonical HTTP reason so diagnostics survive.
/// Only an unparseable 2xx body with no banner is a decode failure.
pub(crate) fn decode_response(
    status_code: u16,
    text: &str,
) -> Result<RawResponse, serde_json::Error> {
    let body = match serde_json::from_str::<Value>(text) {
        Ok(body) => body,
        Err(err) => {
            if let Some(captures) = API_VERSION_RE.captures(text) {
                json!({ "api_version": captures[1].to_owned() })
            } else if is_success(status_code) {
                return Err(err);
            } else {
                json!({ "message": status_reason(status_code) })
            }
        }
    };

    let token_invalid = status_code == 401
        && body.get("status").and_then(Value::as_str) == Some(TOKEN_INVALID_STATUS);

    Ok(RawResponse {
        status_code,
        body,
        token_invalid,
    })
}

pub(crate) fn is_success(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

/// Server-provided `status` field, when present.
pub(crate) fn body_status(body: &Value) -> Option<String> {
    body.get("status")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Best-effort human-readable message: the body's `message` field (stringified
/// when the gateway nests an object there), falling back to the canonical
/// HTTP reason phrase.
pub(crate) fn body_message(body: &Value, status_code: u16) -> Option<String> {
    match body.get("message") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Null) | None => Some(status_reason(status_code)),
        Some(other) => Some(other.to_string()),
    }
}

fn status_reason(status_code: u16) -> String {
    reqwest::StatusCode::from_u16(status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_owned()
}
