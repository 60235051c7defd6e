//! Error types for player and performance persistence

/// Errors from the durable stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("persistence failed: {0}")]
    Persistence(#[from] common::Error),

    #[error("unknown player {0}")]
    UnknownPlayer(u64),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
