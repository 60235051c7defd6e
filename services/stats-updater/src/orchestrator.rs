//! Per-player and per-batch update driver
//!
//! `update_one` borrows a single credential for all of a player's lookups so
//! the cached token is reused across modes. `update_all` fans players out to
//! a bounded set of tasks sized from the number of usable credentials.
//!
//! Batch flow:
//! 1. Snapshot players (deduplicated by id) and active credentials
//! 2. No active credential → abort with zero updates
//! 3. Dispatch one task per player, at most `min(max_workers, 2 × active)` at a time
//! 4. A worker that exhausts capacity stops further dispatch; running tasks finish
//! 5. Tally results; a panicking task counts as a failure and is logged

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use osu_api::Mode;
use osu_pool::{FetchClient, Fetched};
use stats_store::{PerformanceRecord, PerformanceStore, PlayerDirectory, TrackedPlayer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What happened to one mode of one player.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeOutcome {
    Updated { pp: f64 },
    NotFound,
    Failed(String),
}

impl ModeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ModeOutcome::Updated { .. })
    }
}

/// Per-mode results for one player.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub player_id: u64,
    pub modes: BTreeMap<Mode, ModeOutcome>,
}

impl UpdateReport {
    pub fn updated_modes(&self) -> usize {
        self.modes.values().filter(|o| o.is_success()).count()
    }
}

/// Why a player could not be updated at all.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// No credential was usable within the retry bound
    #[error(transparent)]
    NoCapacity(osu_pool::Error),

    #[error("player {0} not found upstream")]
    PlayerNotFound(u64),

    #[error("profile for player {player_id} unavailable: {reason}")]
    ProfileUnavailable { player_id: u64, reason: String },
}

/// Outcome of one `update_all` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: String,
    /// Distinct players in the snapshot
    pub players_total: usize,
    pub updated: usize,
    pub failed: usize,
    /// Dispatch stopped before every player was attempted
    pub aborted: bool,
}

/// Concurrency cap for a batch.
pub fn worker_count(max_workers: usize, active_credentials: usize) -> usize {
    max_workers.min(active_credentials.saturating_mul(2))
}

/// Drives fetch-and-persist for tracked players.
#[derive(Clone)]
pub struct UpdateOrchestrator {
    fetcher: Arc<FetchClient>,
    players: Arc<dyn PlayerDirectory>,
    performance: Arc<dyn PerformanceStore>,
    max_workers: usize,
}

impl UpdateOrchestrator {
    pub fn new(
        fetcher: Arc<FetchClient>,
        players: Arc<dyn PlayerDirectory>,
        performance: Arc<dyn PerformanceStore>,
        max_workers: usize,
    ) -> Self {
        Self {
            fetcher,
            players,
            performance,
            max_workers,
        }
    }

    /// Refresh one player's profile and all four mode records.
    ///
    /// The profile comes from a base `standard` lookup; each mode then gets
    /// its own lookup, `standard` included. A failure in one mode is recorded
    /// in the report and does not stop the others.
    pub async fn update_one(&self, player: &TrackedPlayer) -> Result<UpdateReport, UpdateError> {
        let pool = self.fetcher.broker().pool();
        let credential = pool
            .get_active_credential()
            .await
            .map_err(UpdateError::NoCapacity)?;
        debug!(player_id = player.id, credential = %credential, "updating player");

        let profile = match self.fetcher.fetch(player.id, Mode::Standard, &credential).await {
            Fetched::Found(payload) => payload,
            Fetched::NotFound => return Err(UpdateError::PlayerNotFound(player.id)),
            Fetched::Unavailable(e) => {
                return Err(UpdateError::ProfileUnavailable {
                    player_id: player.id,
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = self
            .players
            .refresh_profile(player.id, profile.username, profile.avatar_url)
            .await
        {
            error!(player_id = player.id, error = %e, "failed to save player profile");
        }

        let mut modes = BTreeMap::new();
        for mode in Mode::ALL {
            let outcome = match self.fetcher.fetch(player.id, mode, &credential).await {
                Fetched::Found(payload) => self.persist(player.id, mode, &payload.stats()).await,
                Fetched::NotFound => ModeOutcome::NotFound,
                Fetched::Unavailable(e) => ModeOutcome::Failed(e.to_string()),
            };
            if let ModeOutcome::Failed(reason) = &outcome {
                warn!(player_id = player.id, %mode, reason = %reason, "mode update failed");
            }
            modes.insert(mode, outcome);
        }

        Ok(UpdateReport {
            player_id: player.id,
            modes,
        })
    }

    async fn persist(&self, player_id: u64, mode: Mode, stats: &osu_api::Statistics) -> ModeOutcome {
        let record = PerformanceRecord::from_statistics(player_id, mode, stats);
        let pp = record.pp;
        match self.performance.upsert(record).await {
            Ok(_) => ModeOutcome::Updated { pp },
            Err(e) => ModeOutcome::Failed(e.to_string()),
        }
    }

    /// Update every tracked player once.
    ///
    /// `cancel` is checked between dispatches; in-flight updates always run
    /// to completion.
    pub async fn update_all(&self, cancel: &CancellationToken) -> BatchSummary {
        let run_id = uuid::Uuid::new_v4().as_simple().to_string();
        let span = info_span!("batch", run_id = %run_id);
        let started = Instant::now();

        let summary = self.run_batch(run_id, cancel).instrument(span).await;

        crate::metrics::record_batch(
            summary.updated,
            summary.aborted,
            started.elapsed().as_secs_f64(),
        );
        summary
    }

    async fn run_batch(&self, run_id: String, cancel: &CancellationToken) -> BatchSummary {
        let mut summary = BatchSummary {
            run_id,
            players_total: 0,
            updated: 0,
            failed: 0,
            aborted: false,
        };

        let players = match self.players.list().await {
            Ok(players) => players,
            Err(e) => {
                error!(error = %e, "could not list tracked players");
                summary.aborted = true;
                return summary;
            }
        };
        let mut seen = HashSet::new();
        let players: Vec<TrackedPlayer> = players.into_iter().filter(|p| seen.insert(p.id)).collect();
        summary.players_total = players.len();

        let active = match self.fetcher.broker().pool().active_credentials().await {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "could not evaluate credentials");
                summary.aborted = true;
                return summary;
            }
        };
        if active.is_empty() {
            warn!(players = summary.players_total, "no active credentials, skipping batch");
            summary.aborted = true;
            return summary;
        }

        let workers = worker_count(self.max_workers, active.len());
        info!(
            players = summary.players_total,
            active_credentials = active.len(),
            workers,
            "starting batch"
        );

        let stop = cancel.child_token();
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        for player in players {
            if stop.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let this = self.clone();
            let stop = stop.clone();
            dispatched += 1;
            tasks.spawn(
                async move {
                    let result = this.update_one(&player).await;
                    if let Err(UpdateError::NoCapacity(_)) = &result {
                        stop.cancel();
                    }
                    drop(permit);
                    (player.id, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.updated += 1;
                    debug!(
                        player_id = report.player_id,
                        modes_updated = report.updated_modes(),
                        "player updated"
                    );
                }
                Ok((player_id, Err(UpdateError::NoCapacity(e)))) => {
                    summary.failed += 1;
                    warn!(player_id, error = %e, "credential capacity exhausted, stopping dispatch");
                }
                Ok((player_id, Err(e))) => {
                    summary.failed += 1;
                    warn!(player_id, error = %e, "player update failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(error = %e, "player update task panicked");
                }
            }
        }

        summary.aborted = dispatched < summary.players_total;
        info!(
            players = summary.players_total,
            updated = summary.updated,
            failed = summary.failed,
            aborted = summary.aborted,
            "batch finished"
        );
        summary
    }
}
