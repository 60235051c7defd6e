//! Error types for credential and token operations

/// Errors from credential storage and token exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid client credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential store error: {0}")]
    Store(#[from] common::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
