//! Error types for stats API requests

use crate::classify::ErrorClassification;

/// Errors from a single profile lookup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("player not found")]
    NotFound,

    #[error("stats endpoint returned {status}: {}", code.as_deref().unwrap_or("no error code"))]
    Status { status: u16, code: Option<String> },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid profile payload: {0}")]
    Decode(String),
}

impl Error {
    /// Map this error onto the classification used for credential health.
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Error::NotFound => ErrorClassification::NotFound,
            Error::Status { status, .. } => crate::classify_status(*status),
            Error::Http(_) | Error::Decode(_) => ErrorClassification::Transient,
        }
    }

    /// Whether the failure should be charged to the credential's error budget.
    ///
    /// Non-2xx statuses (other than 404) and network failures are. A 200 with
    /// an undecodable body is an upstream schema problem, not a credential one.
    pub fn counts_against_credential(&self) -> bool {
        match self {
            Error::Status { .. } => self.classification() == ErrorClassification::Transient,
            Error::Http(_) => true,
            Error::NotFound | Error::Decode(_) => false,
        }
    }
}

/// Result alias for stats API requests.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_benign() {
        let err = Error::NotFound;
        assert_eq!(err.classification(), ErrorClassification::NotFound);
        assert!(!err.counts_against_credential());
    }

    #[test]
    fn server_errors_count_against_credential() {
        let err = Error::Status {
            status: 503,
            code: None,
        };
        assert_eq!(err.classification(), ErrorClassification::Transient);
        assert!(err.counts_against_credential());
        assert!(Error::Http("connection refused".into()).counts_against_credential());
    }

    #[test]
    fn decode_errors_do_not_count_against_credential() {
        assert!(!Error::Decode("expected value".into()).counts_against_credential());
    }

    #[test]
    fn status_display_includes_code() {
        let err = Error::Status {
            status: 401,
            code: Some("invalid_token".into()),
        };
        assert_eq!(err.to_string(), "stats endpoint returned 401: invalid_token");
    }
}
