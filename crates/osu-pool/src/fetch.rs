//! One stat lookup for one (player, mode) pair
//!
//! Combines the broker's token, a quota unit for the data request itself and
//! the upstream GET, then charges the credential's error budget according to
//! the outcome. Expected outcomes never surface as `Err`: the caller gets a
//! [`Fetched`] and decides whether to skip, retry or abort.

use std::sync::Arc;

use osu_api::{Mode, UserPayload, get_user};
use tracing::{debug, warn};

use crate::broker::TokenBroker;
use crate::error::Error;

/// Result of a single lookup.
#[derive(Debug)]
pub enum Fetched {
    Found(UserPayload),
    /// Upstream has no such player for this mode. Not a credential error.
    NotFound,
    /// No token, no quota, or an upstream/network failure.
    Unavailable(Error),
}

impl Fetched {
    /// Label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            Fetched::Found(_) => "found",
            Fetched::NotFound => "not_found",
            Fetched::Unavailable(_) => "unavailable",
        }
    }

    pub fn into_payload(self) -> Option<UserPayload> {
        match self {
            Fetched::Found(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Performs profile lookups through the pool.
pub struct FetchClient {
    broker: Arc<TokenBroker>,
    http: reqwest::Client,
    api_base: String,
}

impl FetchClient {
    pub fn new(broker: Arc<TokenBroker>, http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            broker,
            http,
            api_base: api_base.into(),
        }
    }

    pub fn broker(&self) -> &Arc<TokenBroker> {
        &self.broker
    }

    /// Look up `player_id` in `mode` using credential `name`.
    ///
    /// A cold token costs two quota units (exchange plus lookup); a warm one
    /// costs one.
    pub async fn fetch(&self, player_id: u64, mode: Mode, name: &str) -> Fetched {
        let fetched = self.fetch_inner(player_id, mode, name).await;
        metrics::counter!(
            "stats_fetch_total",
            "mode" => mode.label(),
            "outcome" => fetched.outcome()
        )
        .increment(1);
        fetched
    }

    async fn fetch_inner(&self, player_id: u64, mode: Mode, name: &str) -> Fetched {
        let token = match self.broker.get_token(name).await {
            Ok(token) => token,
            Err(e) => {
                debug!(player_id, %mode, credential = name, error = %e, "no token for lookup");
                return Fetched::Unavailable(e);
            }
        };

        let pool = self.broker.pool();
        match pool.increment_counter(name).await {
            Ok(true) => {}
            Ok(false) => return Fetched::Unavailable(Error::QuotaExceeded(name.to_string())),
            Err(e) => return Fetched::Unavailable(e),
        }

        match get_user(&self.http, &self.api_base, token.expose(), player_id, mode).await {
            Ok(payload) => Fetched::Found(payload),
            Err(osu_api::Error::NotFound) => Fetched::NotFound,
            Err(e) => {
                warn!(player_id, %mode, credential = name, error = %e, "stat lookup failed");
                if e.counts_against_credential() {
                    if let Err(store_err) = pool.increment_error(name).await {
                        warn!(credential = name, error = %store_err, "could not record credential error");
                    }
                }
                Fetched::Unavailable(Error::Transient(e.to_string()))
            }
        }
    }
}
