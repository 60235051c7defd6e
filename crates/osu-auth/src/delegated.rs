//! Delegated end-user tokens
//!
//! The login flow (outside this service) stores each signed-in user's
//! access token here. Profile lookups may borrow the freshest unexpired one
//! instead of spending shared application quota on a token exchange.
//!
//! The login flow keeps writing while the service runs, so a file-backed
//! store re-reads the file on every lookup and merges inserts into it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::Result;

/// An end-user access token with its absolute expiry (unix millis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserToken {
    pub access_token: Secret<String>,
    pub expires_at: u64,
}

/// Tokens keyed by the owning user's id. Optionally file-backed.
pub struct UserTokenStore {
    path: Option<PathBuf>,
    state: RwLock<BTreeMap<u64, UserToken>>,
}

impl UserTokenStore {
    /// An empty store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load tokens written by the login flow, creating an empty file if absent.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state: BTreeMap<u64, UserToken> = common::read_json_or_default(&path).await?;
        info!(path = %path.display(), tokens = state.len(), "loaded delegated user tokens");
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Record (or replace) a user's token.
    pub async fn insert(&self, user_id: u64, token: UserToken) -> Result<()> {
        let mut state = self.state.write().await;
        match &self.path {
            Some(path) => {
                let mut current: BTreeMap<u64, UserToken> =
                    common::read_json_or_default(path).await?;
                current.insert(user_id, token);
                common::write_json_atomic(path, &current).await?;
                *state = current;
            }
            None => {
                state.insert(user_id, token);
            }
        }
        Ok(())
    }

    /// The unexpired token with the latest expiry, if any.
    ///
    /// An unreadable file falls back to the tokens seen on the last read.
    pub async fn freshest(&self, now_millis: u64) -> Option<Secret<String>> {
        if let Some(path) = &self.path {
            match common::read_json_or_default::<BTreeMap<u64, UserToken>>(path).await {
                Ok(current) => *self.state.write().await = current,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not reload delegated user tokens");
                }
            }
        }
        let state = self.state.read().await;
        state
            .values()
            .filter(|t| t.expires_at >= now_millis)
            .max_by_key(|t| t.expires_at)
            .map(|t| t.access_token.clone())
    }
}
