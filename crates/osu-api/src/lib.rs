//! osu! stats API surface
//!
//! Game modes, the profile payload returned by `GET /users/{id}/{mode}`,
//! classification of non-200 outcomes, and the single stat-lookup request.
//! Nothing here knows about credentials or quotas; the pool crate layers
//! those on top of [`get_user`].

pub mod classify;
pub mod client;
pub mod error;

pub use classify::{ErrorClassification, classify_status, error_code};
pub use client::get_user;
pub use error::{Error, Result};

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four game-variant buckets a player is ranked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Standard,
    Taiko,
    Fruits,
    Mania,
}

impl Mode {
    /// All modes in update order. `Standard` comes first because its payload
    /// doubles as the player's profile.
    pub const ALL: [Mode; 4] = [Mode::Standard, Mode::Taiko, Mode::Fruits, Mode::Mania];

    /// Path segment used by the upstream API.
    pub fn api_name(self) -> &'static str {
        match self {
            Mode::Standard => "osu",
            Mode::Taiko => "taiko",
            Mode::Fruits => "fruits",
            Mode::Mania => "mania",
        }
    }

    /// Label for logs, metrics and storage.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Taiko => "taiko",
            Mode::Fruits => "fruits",
            Mode::Mania => "mania",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Profile payload for one (player, mode) lookup.
///
/// Only the fields this service persists are modelled; everything else in
/// the upstream document is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserPayload {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

impl UserPayload {
    /// Statistics block, or an all-zero block when upstream omitted it.
    pub fn stats(&self) -> Statistics {
        self.statistics.clone().unwrap_or_default()
    }
}

/// Per-mode statistics. Upstream sends `null` for ranks of inactive players
/// and may send `null` for numeric fields on fresh accounts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Statistics {
    #[serde(default)]
    pub global_rank: Option<u64>,
    #[serde(default)]
    pub country_rank: Option<u64>,
    #[serde(default)]
    pub pp: Option<f64>,
    #[serde(default)]
    pub hit_accuracy: Option<f64>,
    #[serde(default)]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub level: Option<Level>,
}

impl Statistics {
    pub fn pp(&self) -> f64 {
        self.pp.unwrap_or(0.0)
    }

    pub fn accuracy(&self) -> f64 {
        self.hit_accuracy.unwrap_or(0.0)
    }

    pub fn playcount(&self) -> u64 {
        self.play_count.unwrap_or(0)
    }

    pub fn level(&self) -> f64 {
        self.level.as_ref().and_then(|l| l.current).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Level {
    #[serde(default)]
    pub current: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_api_names() {
        let names: Vec<_> = Mode::ALL.iter().map(|m| m.api_name()).collect();
        assert_eq!(names, vec!["osu", "taiko", "fruits", "mania"]);
    }

    #[test]
    fn mode_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&Mode::Standard).unwrap(),
            "\"standard\""
        );
        let mode: Mode = serde_json::from_str("\"fruits\"").unwrap();
        assert_eq!(mode, Mode::Fruits);
    }

    #[test]
    fn payload_parses_statistics() {
        let json = r#"{
            "username": "peppy",
            "avatar_url": "https://a.ppy.sh/2",
            "statistics": {
                "pp": 120.5,
                "global_rank": 500,
                "country_rank": null,
                "hit_accuracy": 98.2,
                "play_count": 1000,
                "level": {"current": 50, "progress": 12}
            },
            "unrelated": [1, 2, 3]
        }"#;
        let payload: UserPayload = serde_json::from_str(json).unwrap();
        let stats = payload.stats();
        assert_eq!(payload.username.as_deref(), Some("peppy"));
        assert_eq!(stats.pp(), 120.5);
        assert_eq!(stats.global_rank, Some(500));
        assert_eq!(stats.country_rank, None);
        assert_eq!(stats.accuracy(), 98.2);
        assert_eq!(stats.playcount(), 1000);
        assert_eq!(stats.level(), 50.0);
    }

    #[test]
    fn missing_statistics_default_to_zero() {
        let payload: UserPayload = serde_json::from_str(r#"{"statistics": null}"#).unwrap();
        let stats = payload.stats();
        assert_eq!(stats.pp(), 0.0);
        assert_eq!(stats.playcount(), 0);
        assert_eq!(stats.level(), 0.0);
        assert!(stats.global_rank.is_none());
    }
}
