//! File-backed player directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::{BoxFuture, PlayerDirectory, TrackedPlayer};

/// Tracked players persisted as a JSON array, keyed in memory by id.
///
/// The file is shared with the ingestion process, so every read and write
/// starts from the current file contents. The in-memory map is the copy as
/// of the last file access.
pub struct PlayerStore {
    path: PathBuf,
    state: RwLock<BTreeMap<u64, TrackedPlayer>>,
}

impl PlayerStore {
    /// Load players from `path`, creating an empty file if absent.
    ///
    /// Duplicate ids in the file collapse to the last entry.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = read_players(&path).await?;
        info!(path = %path.display(), players = state.len(), "loaded tracked players");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Re-read the file, picking up players added or removed by other writers.
    pub async fn reload(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        *state = read_players(&self.path).await?;
        debug!(players = state.len(), "reloaded tracked players");
        Ok(state.len())
    }

    /// Add or replace a player.
    pub async fn insert(&self, player: TrackedPlayer) -> Result<()> {
        let mut state = self.state.write().await;
        let mut current = read_players(&self.path).await?;
        current.insert(player.id, player);
        self.persist(&current).await?;
        *state = current;
        Ok(())
    }

    pub async fn get(&self, player_id: u64) -> Option<TrackedPlayer> {
        self.state.read().await.get(&player_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, state: &BTreeMap<u64, TrackedPlayer>) -> Result<()> {
        let players: Vec<&TrackedPlayer> = state.values().collect();
        common::write_json_atomic(&self.path, &players).await?;
        Ok(())
    }
}

async fn read_players(path: &Path) -> Result<BTreeMap<u64, TrackedPlayer>> {
    let players: Vec<TrackedPlayer> = common::read_json_or_default(path).await?;
    Ok(players.into_iter().map(|p| (p.id, p)).collect())
}

impl PlayerDirectory for PlayerStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<TrackedPlayer>>> {
        Box::pin(async move {
            self.reload().await?;
            Ok(self.state.read().await.values().cloned().collect())
        })
    }

    fn refresh_profile(
        &self,
        player_id: u64,
        nick: Option<String>,
        avatar_url: Option<String>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let mut current = read_players(&self.path).await?;
            let Some(player) = current.get_mut(&player_id) else {
                *state = current;
                return Err(Error::UnknownPlayer(player_id));
            };

            let before = player.clone();
            if let Some(nick) = nick.filter(|n| !n.is_empty()) {
                player.nick = nick;
            }
            player.avatar_url = avatar_url;

            if *player != before {
                debug!(player_id, "refreshed player profile");
                self.persist(&current).await?;
            }
            *state = current;
            Ok(())
        })
    }
}
