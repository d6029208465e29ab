//! Request matching for playback.

use super::cassette::RecordedRequest;
use crate::transport::HttpRequest;
use serde_json::Value;

/// Returns true if `request` may be answered by `recorded`.
///
/// Method and URL must be equal. A request without a body, or with a body
/// identical to the recorded one, matches. JSON bodies are compared
/// structurally so key order does not matter. Differing bodies of any other
/// content type are accepted.
pub fn matches(request: &HttpRequest, recorded: &RecordedRequest) -> bool {
    if !request.method.as_str().eq_ignore_ascii_case(&recorded.method)
        || request.url != recorded.url
    {
        return false;
    }

    let Some(body) = request.body.as_deref() else {
        return true;
    };
    let recorded_body = recorded.body.as_deref().unwrap_or_default();
    if body == recorded_body {
        return true;
    }

    let is_json = request
        .content_type()
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return true;
    }

    let request_json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse request JSON");
            return false;
        }
    };
    let recorded_json: Value = match serde_json::from_str(recorded_body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse cassette JSON");
            return false;
        }
    };
    request_json == recorded_json
}
