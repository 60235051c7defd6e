//! Tracked players and their per-mode performance records
//!
//! The updater reads players through [`PlayerDirectory`] and writes stats
//! through [`PerformanceStore`]. Both are traits so the orchestrator can be
//! driven against any backing store; the JSON-file implementations here
//! persist with the same atomic temp-file + rename as the credential store.
//!
//! Players are created by an external ingestion process. This crate only
//! refreshes their nick and avatar, merging into whatever the file holds at
//! the time of the write.

pub mod error;
pub mod performance;
pub mod players;

pub use error::{Error, Result};
pub use performance::FilePerformanceStore;
pub use players::PlayerStore;

use std::future::Future;
use std::pin::Pin;

use osu_api::{Mode, Statistics};
use serde::{Deserialize, Serialize};

/// Boxed future returned by the store traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A player whose statistics are kept up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPlayer {
    /// Upstream user id
    pub id: u64,
    pub nick: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Latest statistics for one (player, mode) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub player_id: u64,
    pub mode: Mode,
    pub global_rank: Option<u64>,
    pub country_rank: Option<u64>,
    pub pp: f64,
    pub accuracy: f64,
    pub level: f64,
    pub playcount: u64,
    /// Unix millis of the last successful write; stamped by the store
    #[serde(default)]
    pub last_updated: u64,
}

impl PerformanceRecord {
    /// Map an upstream statistics block onto a record. Missing numbers become 0.
    pub fn from_statistics(player_id: u64, mode: Mode, stats: &Statistics) -> Self {
        Self {
            player_id,
            mode,
            global_rank: stats.global_rank,
            country_rank: stats.country_rank,
            pp: stats.pp(),
            accuracy: stats.accuracy(),
            level: stats.level(),
            playcount: stats.playcount(),
            last_updated: 0,
        }
    }
}

/// Whether an upsert inserted a new record or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Read access to tracked players plus the profile refresh.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn PlayerDirectory>`).
pub trait PlayerDirectory: Send + Sync {
    /// Every tracked player, as currently persisted.
    fn list(&self) -> BoxFuture<'_, Result<Vec<TrackedPlayer>>>;

    /// Update a player's nick (only when upstream supplied one) and avatar.
    fn refresh_profile(
        &self,
        player_id: u64,
        nick: Option<String>,
        avatar_url: Option<String>,
    ) -> BoxFuture<'_, Result<()>>;
}

/// One record per (player, mode), created on first write and overwritten after.
pub trait PerformanceStore: Send + Sync {
    fn upsert(&self, record: PerformanceRecord) -> BoxFuture<'_, Result<UpsertOutcome>>;

    fn get(&self, player_id: u64, mode: Mode) -> BoxFuture<'_, Option<PerformanceRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_statistics() {
        let stats: Statistics = serde_json::from_str(
            r#"{"pp":120.5,"global_rank":42,"country_rank":null,"hit_accuracy":97.5,
                "play_count":900,"level":{"current":88.4}}"#,
        )
        .unwrap();
        let record = PerformanceRecord::from_statistics(7, Mode::Mania, &stats);
        assert_eq!(record.player_id, 7);
        assert_eq!(record.mode, Mode::Mania);
        assert_eq!(record.global_rank, Some(42));
        assert_eq!(record.country_rank, None);
        assert_eq!(record.pp, 120.5);
        assert_eq!(record.accuracy, 97.5);
        assert_eq!(record.level, 88.4);
        assert_eq!(record.playcount, 900);
    }

    #[test]
    fn empty_statistics_become_zeroes() {
        let record = PerformanceRecord::from_statistics(1, Mode::Taiko, &Statistics::default());
        assert_eq!(record.pp, 0.0);
        assert_eq!(record.playcount, 0);
        assert!(record.global_rank.is_none());
    }
}
