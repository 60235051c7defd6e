//! osu! API application credentials
//!
//! Durable credential rows, the client-credentials token exchange, and the
//! store of delegated end-user tokens handed over by the login flow.
//!
//! Credential flow:
//! 1. Configuration provisions rows via `CredentialStore::ensure()`
//! 2. The pool mutates quota/health fields through `CredentialStore::update()`
//! 3. The broker calls `token::request_client_token()` when the cached token is stale
//! 4. The new token and its expiry are cached back on the row

pub mod constants;
pub mod credentials;
pub mod delegated;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use delegated::{UserToken, UserTokenStore};
pub use error::{Error, Result};
pub use token::{TokenResponse, request_client_token};
