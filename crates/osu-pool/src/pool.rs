//! Rate limiter, circuit breaker and least-loaded credential selection
//!
//! Quota and health rules are applied to credential rows inside
//! `CredentialStore::update`, so the reset check, capacity check and
//! increment for one call happen as a single serialized step. Concurrent
//! workers can never both observe the last unit of capacity and both spend it.
//!
//! Circuit transitions happen lazily: a suspended credential whose errors have
//! aged out of the window is reactivated the next time the pool evaluates it.
//! There is no timer task.

use std::sync::Arc;
use std::time::Duration;

use osu_auth::{Credential, CredentialStore};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Circuit state of a credential.
///
/// Transitions:
/// - Active → Suspended (recent error count reaches the threshold)
/// - Suspended → Active (on evaluation, recent errors fell below the threshold)
///
/// Suspension never touches the request counter or the cached token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Active,
    Suspended,
}

impl CredentialState {
    pub fn of(credential: &Credential) -> Self {
        if credential.is_active {
            CredentialState::Active
        } else {
            CredentialState::Suspended
        }
    }

    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Active => "active",
            CredentialState::Suspended => "suspended",
        }
    }
}

/// Per-credential quota and error budget.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    /// Requests allowed per window
    pub rate_limit: u32,
    /// Window length; the counter resets once the window start is older than this
    pub window: Duration,
    /// Recent errors that open the circuit
    pub error_threshold: usize,
    /// How long an error counts as recent
    pub error_window: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            rate_limit: 60,
            window: Duration::from_secs(60),
            error_threshold: 3,
            error_window: Duration::from_secs(900),
        }
    }
}

impl PoolLimits {
    fn reset_window_if_needed(&self, c: &mut Credential, now: u64) -> bool {
        if now.saturating_sub(c.reset_time) > self.window.as_millis() as u64 {
            c.requests_count = 0;
            c.reset_time = now;
            true
        } else {
            false
        }
    }

    fn has_capacity(&self, c: &Credential) -> bool {
        c.requests_count < self.rate_limit
    }

    /// Drop errors outside the window and return how many remain.
    fn prune_errors(&self, c: &mut Credential, now: u64) -> usize {
        let window = self.error_window.as_millis() as u64;
        c.error_timestamps.retain(|t| now.saturating_sub(*t) < window);
        c.error_timestamps.len()
    }

    fn recent_errors(&self, c: &Credential, now: u64) -> usize {
        let window = self.error_window.as_millis() as u64;
        c.error_timestamps
            .iter()
            .filter(|t| now.saturating_sub(**t) < window)
            .count()
    }

    /// Reactivate a suspended credential whose errors have aged out.
    /// Returns true if the circuit closed.
    fn close_circuit_if_recovered(&self, c: &mut Credential, now: u64) -> bool {
        let recent = self.prune_errors(c, now);
        if recent < self.error_threshold && !c.is_active {
            c.is_active = true;
            true
        } else {
            false
        }
    }
}

/// Bounded retry schedule for `get_active_credential`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of scans before giving up
    pub max_retries: u32,
    /// Wait after the first empty scan; doubles after each subsequent one
    pub base_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 12,
            base_wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `base_wait * 2^attempt`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_wait
            .saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }
}

/// Pool of API credentials sharing one durable store.
pub struct CredentialPool {
    store: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    limits: PoolLimits,
    retry: RetryPolicy,
}

impl CredentialPool {
    pub fn new(
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
        limits: PoolLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
            retry,
        }
    }

    /// Whether `name` has capacity left in its window, resetting the window
    /// first if it has lapsed. Consumes nothing.
    pub async fn can_make_request(&self, name: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let ok = self
            .store
            .update(name, |c| {
                limits.reset_window_if_needed(c, now);
                limits.has_capacity(c)
            })
            .await?;
        Ok(ok)
    }

    /// Consume one unit of `name`'s quota if any is left.
    ///
    /// Window reset, capacity check and increment run under one store lock.
    pub async fn increment_counter(&self, name: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let ok = self
            .store
            .update(name, |c| {
                limits.reset_window_if_needed(c, now);
                if limits.has_capacity(c) {
                    c.requests_count += 1;
                    true
                } else {
                    false
                }
            })
            .await?;
        if !ok {
            debug!(credential = name, "rate limit reached for this window");
        }
        Ok(ok)
    }

    /// The active credential with the lowest request count that still has
    /// capacity. Ties go to the first by name.
    pub async fn select_candidate(&self) -> Result<Option<String>> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let selected = self
            .store
            .update_all(|rows| {
                let mut best: Option<(u32, String)> = None;
                for c in rows.iter_mut() {
                    if !c.is_active {
                        continue;
                    }
                    limits.reset_window_if_needed(c, now);
                    if !limits.has_capacity(c) {
                        continue;
                    }
                    if best
                        .as_ref()
                        .is_none_or(|(count, _)| c.requests_count < *count)
                    {
                        best = Some((c.requests_count, c.name.clone()));
                    }
                }
                best.map(|(_, name)| name)
            })
            .await?;
        Ok(selected)
    }

    /// Run the circuit-breaker recovery rule over every credential.
    pub async fn reevaluate_all(&self) -> Result<()> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let reactivated = self
            .store
            .update_all(|rows| {
                rows.iter_mut()
                    .filter_map(|c| {
                        limits
                            .close_circuit_if_recovered(c, now)
                            .then(|| c.name.clone())
                    })
                    .collect::<Vec<_>>()
            })
            .await?;
        for name in reactivated {
            info!(credential = %name, "errors aged out, credential reactivated");
        }
        Ok(())
    }

    /// Acquire a credential with capacity, backing off when none has any.
    ///
    /// Each attempt re-evaluates every circuit and then selects. Between
    /// empty scans the caller sleeps `base_wait * 2^attempt`; there is no
    /// sleep after the last scan. Exhaustion is a retryable condition for the
    /// caller, not a fatal one.
    pub async fn get_active_credential(&self) -> Result<String> {
        let attempts = self.retry.max_retries;
        for attempt in 0..attempts {
            self.reevaluate_all().await?;
            if let Some(name) = self.select_candidate().await? {
                debug!(credential = %name, attempt = attempt + 1, "selected credential");
                return Ok(name);
            }
            if attempt + 1 < attempts {
                let wait = self.retry.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    wait_secs = wait.as_secs_f64(),
                    "no credential with capacity, backing off"
                );
                self.clock.sleep(wait).await;
            }
        }
        error!(attempts, "all credentials exhausted after retries");
        Err(Error::CapacityExhausted { attempts })
    }

    /// Record an error against `name`; opens the circuit at the threshold.
    pub async fn increment_error(&self, name: &str) -> Result<CredentialState> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let (state, recent, tripped) = self
            .store
            .update(name, |c| {
                c.error_timestamps.push(now);
                let recent = limits.prune_errors(c, now);
                let tripped = recent >= limits.error_threshold && c.is_active;
                if recent >= limits.error_threshold {
                    c.is_active = false;
                }
                (CredentialState::of(c), recent, tripped)
            })
            .await?;

        if tripped {
            warn!(
                credential = name,
                recent_errors = recent,
                "error threshold reached, credential suspended"
            );
            metrics::counter!("pool_credential_suspended_total", "credential" => name.to_string())
                .increment(1);
        } else {
            debug!(credential = name, recent_errors = recent, "credential error recorded");
        }
        Ok(state)
    }

    /// Prune aged-out errors and reactivate `name` if it has recovered.
    pub async fn reset_errors_if_needed(&self, name: &str) -> Result<CredentialState> {
        let now = self.clock.now_millis();
        let limits = self.limits;
        let (state, reactivated) = self
            .store
            .update(name, |c| {
                let reactivated = limits.close_circuit_if_recovered(c, now);
                (CredentialState::of(c), reactivated)
            })
            .await?;
        if reactivated {
            info!(credential = name, "errors aged out, credential reactivated");
        }
        Ok(state)
    }

    /// Names of credentials that are active after re-evaluating every circuit.
    pub async fn active_credentials(&self) -> Result<Vec<String>> {
        self.reevaluate_all().await?;
        Ok(self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| c.name)
            .collect())
    }

    /// Pool health summary for the status endpoint.
    ///
    /// Never exposes secrets or tokens. Status mapping: all active → healthy,
    /// some active → degraded, none active (or no credentials) → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let now = self.clock.now_millis();
        let credentials = self.store.snapshot().await;

        let mut active = 0usize;
        let mut rows = Vec::with_capacity(credentials.len());
        for c in &credentials {
            let state = CredentialState::of(c);
            if state == CredentialState::Active {
                active += 1;
            }
            rows.push(serde_json::json!({
                "name": c.name,
                "state": state.label(),
                "requests_count": c.requests_count,
                "recent_errors": self.limits.recent_errors(c, now),
                "token_cached": c.cached_token.is_some(),
            }));
        }

        let total = credentials.len();
        let status = if active == total && total > 0 {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "credentials_total": total,
            "credentials_active": active,
            "credentials_suspended": total - active,
            "credentials": rows,
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }
}
