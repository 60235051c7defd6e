//! Outcome classification for stats API responses
//!
//! A 404 means the player is absent or restricted, which is an expected
//! outcome and must not count against the credential. Every other non-2xx
//! status is treated as a transient failure that feeds the credential's
//! error budget.

/// How a non-200 upstream response affects the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Player absent or restricted; skip the mode, credential health unaffected
    NotFound,
    /// Anything else; counts toward the credential's circuit breaker
    Transient,
}

/// Classify a non-200 HTTP status from the profile endpoint.
pub fn classify_status(status: u16) -> ErrorClassification {
    match status {
        404 => ErrorClassification::NotFound,
        _ => ErrorClassification::Transient,
    }
}

/// Extract the `error` field from an upstream error body, if present.
///
/// The token and profile endpoints both answer failures with a JSON object
/// carrying a string `error` code (e.g. `invalid_client`).
pub fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_owned)
}
