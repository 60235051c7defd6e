//! File-backed performance records

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use osu_api::Mode;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::{BoxFuture, PerformanceRecord, PerformanceStore, UpsertOutcome};

/// Performance records persisted as a JSON array, unique per (player, mode).
pub struct FilePerformanceStore {
    path: PathBuf,
    state: Mutex<BTreeMap<(u64, Mode), PerformanceRecord>>,
}

impl FilePerformanceStore {
    /// Load records from `path`, creating an empty file if absent.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let records: Vec<PerformanceRecord> = common::read_json_or_default(&path).await?;
        let state: BTreeMap<_, _> = records
            .into_iter()
            .map(|r| ((r.player_id, r.mode), r))
            .collect();
        info!(path = %path.display(), records = state.len(), "loaded performance records");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All records for one player, in mode order.
    pub async fn for_player(&self, player_id: u64) -> Vec<PerformanceRecord> {
        self.state
            .lock()
            .await
            .range((player_id, Mode::Standard)..=(player_id, Mode::Mania))
            .map(|(_, r)| r.clone())
            .collect()
    }
}

impl PerformanceStore for FilePerformanceStore {
    fn upsert(&self, mut record: PerformanceRecord) -> BoxFuture<'_, Result<UpsertOutcome>> {
        Box::pin(async move {
            record.last_updated = now_millis();
            let key = (record.player_id, record.mode);

            let mut state = self.state.lock().await;
            let previous = state.insert(key, record);
            let outcome = if previous.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Created
            };
            let written = {
                let records: Vec<&PerformanceRecord> = state.values().collect();
                common::write_json_atomic(&self.path, &records).await
            };
            if let Err(e) = written {
                match previous {
                    Some(previous) => state.insert(key, previous),
                    None => state.remove(&key),
                };
                return Err(e.into());
            }

            debug!(player_id = key.0, mode = %key.1, ?outcome, "stored performance record");
            Ok(outcome)
        })
    }

    fn get(&self, player_id: u64, mode: Mode) -> BoxFuture<'_, Option<PerformanceRecord>> {
        Box::pin(async move { self.state.lock().await.get(&(player_id, mode)).cloned() })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(player_id: u64, mode: Mode, pp: f64) -> PerformanceRecord {
        PerformanceRecord {
            player_id,
            mode,
            global_rank: Some(100),
            country_rank: None,
            pp,
            accuracy: 98.0,
            level: 90.0,
            playcount: 10,
            last_updated: 0,
        }
    }

    #[tokio::test]
    async fn first_write_creates_then_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePerformanceStore::load(dir.path().join("performance.json"))
            .await
            .unwrap();

        let first = store.upsert(record(1, Mode::Standard, 100.0)).await.unwrap();
        assert_eq!(first, UpsertOutcome::Created);

        let second = store.upsert(record(1, Mode::Standard, 150.0)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        assert_eq!(store.len().await, 1);
        let stored = store.get(1, Mode::Standard).await.unwrap();
        assert_eq!(stored.pp, 150.0);
        assert!(stored.last_updated > 0);
    }

    #[tokio::test]
    async fn modes_are_separate_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePerformanceStore::load(dir.path().join("performance.json"))
            .await
            .unwrap();
        for mode in Mode::ALL {
            store.upsert(record(1, mode, 1.0)).await.unwrap();
        }
        store.upsert(record(2, Mode::Taiko, 1.0)).await.unwrap();

        assert_eq!(store.len().await, 5);
        let modes: Vec<Mode> = store.for_player(1).await.iter().map(|r| r.mode).collect();
        assert_eq!(modes, Mode::ALL.to_vec());
    }

    #[tokio::test]
    async fn failed_write_is_not_visible() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state");
        std::fs::create_dir(&nested).unwrap();
        let store = FilePerformanceStore::load(nested.join("performance.json"))
            .await
            .unwrap();
        store.upsert(record(1, Mode::Standard, 100.0)).await.unwrap();

        std::fs::remove_dir_all(&nested).unwrap();

        assert!(store.upsert(record(1, Mode::Standard, 999.0)).await.is_err());
        assert!(store.upsert(record(2, Mode::Taiko, 1.0)).await.is_err());
        assert_eq!(store.get(1, Mode::Standard).await.unwrap().pp, 100.0);
        assert!(store.get(2, Mode::Taiko).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn records_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performance.json");
        let store = FilePerformanceStore::load(path.clone()).await.unwrap();
        store.upsert(record(5, Mode::Fruits, 77.7)).await.unwrap();

        let reloaded = FilePerformanceStore::load(path).await.unwrap();
        assert_eq!(reloaded.get(5, Mode::Fruits).await.unwrap().pp, 77.7);
        assert!(reloaded.get(5, Mode::Mania).await.is_none());
    }
}
