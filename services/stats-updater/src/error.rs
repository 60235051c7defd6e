//! Service-specific error types

use thiserror::Error;

/// Stats updater lifecycle errors.
///
/// Per-player failures are reported in the batch summary and never
/// propagate this far.
#[derive(Error, Debug)]
pub enum Error {
    #[error("client secret for credential {credential} unavailable: {reason}")]
    MissingSecret { credential: String, reason: String },

    #[error("no credentials configured or stored")]
    NoCredentials,
}
