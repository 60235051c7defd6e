//! Error types for pool operations

/// Errors from pool, broker and fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credential had capacity after the bounded retry/backoff loop
    #[error("no credential capacity after {attempts} attempts")]
    CapacityExhausted { attempts: u32 },

    /// The chosen credential ran out of window quota mid-operation
    #[error("credential {0} has no quota left in this window")]
    QuotaExceeded(String),

    #[error("player not found")]
    NotFound,

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("unknown credential: {0}")]
    UnknownCredential(String),

    #[error("credential store error: {0}")]
    Credential(String),
}

impl From<osu_auth::Error> for Error {
    fn from(e: osu_auth::Error) -> Self {
        match e {
            osu_auth::Error::NotFound(msg) => Error::UnknownCredential(msg),
            other => Error::Credential(other.to_string()),
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
