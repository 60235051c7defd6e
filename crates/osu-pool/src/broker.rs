//! Bearer token cache per credential
//!
//! A cached application token is reused while it stays valid for more than
//! five minutes. Refreshing costs one quota unit and, on failure, one entry
//! in the credential's error budget. Concurrent refreshes of the same
//! credential are coalesced behind a per-credential lock so only one caller
//! performs the exchange.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use osu_auth::{Credential, UserTokenStore, request_client_token};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pool::CredentialPool;

/// Minimum remaining lifetime for a cached token to be reused.
pub const TOKEN_REUSE_MARGIN: Duration = Duration::from_secs(300);

/// Obtains bearer tokens for pool credentials.
pub struct TokenBroker {
    pool: Arc<CredentialPool>,
    http: reqwest::Client,
    token_url: String,
    scope: String,
    delegated: Option<Arc<UserTokenStore>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenBroker {
    pub fn new(
        pool: Arc<CredentialPool>,
        http: reqwest::Client,
        token_url: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            http,
            token_url: token_url.into(),
            scope: scope.into(),
            delegated: None,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Prefer the freshest unexpired end-user token from `store` over the
    /// pool path whenever one exists.
    pub fn with_delegated(mut self, store: Arc<UserTokenStore>) -> Self {
        self.delegated = Some(store);
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Bearer token to use on behalf of credential `name`.
    pub async fn get_token(&self, name: &str) -> Result<Secret<String>> {
        if let Some(store) = &self.delegated {
            if let Some(token) = store.freshest(self.pool.clock().now_millis()).await {
                debug!(credential = name, "using delegated user token");
                return Ok(token);
            }
        }

        if let Some(token) = self.cached(name).await? {
            return Ok(token);
        }

        let lock = self.refresh_lock(name).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached(name).await? {
            debug!(credential = name, "reusing token refreshed by concurrent caller");
            return Ok(token);
        }

        self.refresh(name).await
    }

    async fn cached(&self, name: &str) -> Result<Option<Secret<String>>> {
        let credential = self
            .pool
            .store()
            .get(name)
            .await
            .ok_or_else(|| Error::UnknownCredential(name.to_string()))?;
        let now = self.pool.clock().now_millis();
        Ok(usable_token(&credential, now))
    }

    async fn refresh_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(name.to_string()).or_default().clone()
    }

    async fn refresh(&self, name: &str) -> Result<Secret<String>> {
        if !self.pool.can_make_request(name).await? || !self.pool.increment_counter(name).await? {
            return Err(Error::QuotaExceeded(name.to_string()));
        }

        let credential = self
            .pool
            .store()
            .get(name)
            .await
            .ok_or_else(|| Error::UnknownCredential(name.to_string()))?;

        let response = match request_client_token(
            &self.http,
            &self.token_url,
            &credential.client_id,
            credential.client_secret.expose(),
            &self.scope,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(credential = name, error = %e, "token exchange failed");
                metrics::counter!("pool_token_exchanges_total", "result" => "failure")
                    .increment(1);
                self.pool.increment_error(name).await?;
                return Err(Error::Transient(e.to_string()));
            }
        };

        let now = self.pool.clock().now_millis();
        let expires_at = now.saturating_add(response.expires_in.saturating_mul(1000));
        let token = Secret::new(response.access_token);
        let cached = token.clone();
        self.pool
            .store()
            .update(name, move |c| {
                c.cached_token = Some(cached);
                c.token_expires_at = Some(expires_at);
            })
            .await?;

        metrics::counter!("pool_token_exchanges_total", "result" => "success").increment(1);
        info!(
            credential = name,
            expires_in_secs = response.expires_in,
            "obtained application token"
        );
        Ok(token)
    }
}

fn usable_token(credential: &Credential, now_millis: u64) -> Option<Secret<String>> {
    let token = credential.cached_token.as_ref()?;
    let expires_at = credential.token_expires_at?;
    let margin = TOKEN_REUSE_MARGIN.as_millis() as u64;
    (expires_at > now_millis.saturating_add(margin)).then(|| token.clone())
}
