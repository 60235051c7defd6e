//! Credential storage for osu! API applications
//!
//! Manages a JSON file mapping credential names to their identity, quota
//! window, cached token and error history. All writes use atomic temp-file +
//! rename. A tokio Mutex serializes every mutation: `update` applies a closure
//! to the row and persists before the lock is released, so counter, error and
//! token fields are never read and written in two separate steps.
//!
//! The store is the single source of truth for credential state. The pool
//! owns the rules (window reset, error pruning); the store owns atomicity.

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One osu! API application: identity plus quota and health state.
///
/// All timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// False while the circuit breaker holds the credential suspended
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Requests consumed in the current rate-limit window
    #[serde(default)]
    pub requests_count: u32,
    /// Start of the current rate-limit window
    #[serde(default)]
    pub reset_time: u64,
    #[serde(default)]
    pub cached_token: Option<Secret<String>>,
    #[serde(default)]
    pub token_expires_at: Option<u64>,
    /// Recent error times, oldest first
    #[serde(default)]
    pub error_timestamps: Vec<u64>,
}

fn default_active() -> bool {
    true
}

impl Credential {
    /// A freshly provisioned credential: active, empty window, no token, no errors.
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        now_millis: u64,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret,
            is_active: true,
            requests_count: 0,
            reset_time: now_millis,
            cached_token: None,
            token_expires_at: None,
            error_timestamps: Vec::new(),
        }
    }
}

/// Thread-safe credential file manager.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, Credential>>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}`. The pool reports
    /// `unhealthy` until credentials are provisioned.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state: BTreeMap<String, Credential> = common::read_json_or_default(&path).await?;
        info!(path = %path.display(), credentials = state.len(), "loaded credentials");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific credential.
    pub async fn get(&self, name: &str) -> Option<Credential> {
        let state = self.state.lock().await;
        state.get(name).cloned()
    }

    /// Clone every credential, ordered by name.
    pub async fn snapshot(&self) -> Vec<Credential> {
        let state = self.state.lock().await;
        state.values().cloned().collect()
    }

    /// List all credential names.
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }

    /// Make sure a configured credential exists.
    ///
    /// A new row starts active with an empty window. An existing row keeps
    /// its quota, token and error history; only the client id and secret are
    /// refreshed from configuration. Returns true if the row was created.
    pub async fn ensure(
        &self,
        name: &str,
        client_id: &str,
        client_secret: Secret<String>,
        now_millis: u64,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let created = match next.get_mut(name) {
            Some(existing) => {
                if existing.client_id == client_id && existing.client_secret == client_secret {
                    return Ok(false);
                }
                // A different application identity invalidates the cached token
                existing.client_id = client_id.to_string();
                existing.client_secret = client_secret;
                existing.cached_token = None;
                existing.token_expires_at = None;
                false
            }
            None => {
                next.insert(
                    name.to_string(),
                    Credential::new(name, client_id, client_secret, now_millis),
                );
                true
            }
        };
        common::write_json_atomic(&self.path, &next).await?;
        *state = next;
        if created {
            info!(credential = name, "provisioned credential");
        } else {
            debug!(credential = name, "refreshed client identity");
        }
        Ok(created)
    }

    /// Apply `f` to one credential under the store lock and persist the result.
    ///
    /// The file is only rewritten when `f` actually changed the row. If the
    /// write fails the row is restored.
    pub async fn update<R>(&self, name: &str, f: impl FnOnce(&mut Credential) -> R) -> Result<R> {
        let mut state = self.state.lock().await;
        let credential = state
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("credential {name} not in store")))?;
        let before = credential.clone();
        let out = f(credential);
        if *credential != before {
            if let Err(e) = common::write_json_atomic(&self.path, &*state).await {
                state.insert(name.to_string(), before);
                return Err(e.into());
            }
        }
        Ok(out)
    }

    /// Apply `f` to every credential (ordered by name) under a single lock
    /// acquisition and persist if anything changed. A failed write restores
    /// every row.
    pub async fn update_all<R>(&self, f: impl FnOnce(&mut [&mut Credential]) -> R) -> Result<R> {
        let mut state = self.state.lock().await;
        let before = state.clone();
        let out = {
            let mut rows: Vec<&mut Credential> = state.values_mut().collect();
            f(rows.as_mut_slice())
        };
        if *state != before {
            if let Err(e) = common::write_json_atomic(&self.path, &*state).await {
                *state = before;
                return Err(e.into());
            }
        }
        Ok(out)
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> Secret<String> {
        Secret::new(s.to_string())
    }

    async fn store_with(dir: &tempfile::TempDir, names: &[&str]) -> CredentialStore {
        let store = CredentialStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();
        for name in names {
            store
                .ensure(name, &format!("id-{name}"), secret("s"), 1_000)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store
            .ensure("primary", "12345", secret("hunter2"), 1_000)
            .await
            .unwrap();
        store
            .update("primary", |c| {
                c.requests_count = 7;
                c.error_timestamps.push(2_000);
            })
            .await
            .unwrap();

        let store2 = CredentialStore::load(path).await.unwrap();
        let cred = store2.get("primary").await.unwrap();
        assert_eq!(cred.client_id, "12345");
        assert_eq!(cred.client_secret.expose(), "hunter2");
        assert_eq!(cred.requests_count, 7);
        assert_eq!(cred.error_timestamps, vec![2_000]);
        assert!(cred.is_active);
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        assert!(!path.exists());
        let store = CredentialStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: BTreeMap<String, Credential> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn ensure_creates_once_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &[]).await;

        assert!(store.ensure("a", "id", secret("s"), 5).await.unwrap());
        store
            .update("a", |c| {
                c.requests_count = 30;
                c.is_active = false;
            })
            .await
            .unwrap();

        assert!(!store.ensure("a", "id", secret("s"), 99).await.unwrap());
        let cred = store.get("a").await.unwrap();
        assert_eq!(cred.requests_count, 30);
        assert!(!cred.is_active);
        assert_eq!(cred.reset_time, 5);
    }

    #[tokio::test]
    async fn ensure_with_new_secret_drops_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a"]).await;
        store
            .update("a", |c| {
                c.cached_token = Some(secret("tok"));
                c.token_expires_at = Some(u64::MAX);
            })
            .await
            .unwrap();

        store.ensure("a", "id-a", secret("rotated"), 0).await.unwrap();
        let cred = store.get("a").await.unwrap();
        assert_eq!(cred.client_secret.expose(), "rotated");
        assert!(cred.cached_token.is_none());
        assert!(cred.token_expires_at.is_none());
    }

    #[tokio::test]
    async fn update_unknown_credential_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &[]).await;
        let result = store.update("ghost", |c| c.requests_count += 1).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn update_all_visits_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["b", "a", "c"]).await;

        let names = store
            .update_all(|rows| rows.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = std::sync::Arc::new(store_with(&dir, &["a"]).await);

        let mut handles = vec![];
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update("a", |c| c.requests_count += 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.get("a").await.unwrap().requests_count, 50);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: BTreeMap<String, Credential> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["a"].requests_count, 50);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state");
        std::fs::create_dir(&nested).unwrap();
        let store = CredentialStore::load(nested.join("credentials.json"))
            .await
            .unwrap();
        store.ensure("a", "id-a", secret("s"), 1_000).await.unwrap();

        // Every later write fails: the temp file has nowhere to go
        std::fs::remove_dir_all(&nested).unwrap();

        assert!(store.update("a", |c| c.requests_count += 1).await.is_err());
        assert!(
            store
                .update_all(|rows| rows.iter_mut().for_each(|c| c.is_active = false))
                .await
                .is_err()
        );
        assert!(store.ensure("b", "id-b", secret("s"), 1_000).await.is_err());

        let cred = store.get("a").await.unwrap();
        assert_eq!(cred.requests_count, 0);
        assert!(cred.is_active);
        assert!(store.get("b").await.is_none());
    }

    #[tokio::test]
    async fn debug_output_redacts_secrets() {
        let mut cred = Credential::new("a", "id", secret("hunter2"), 0);
        cred.cached_token = Some(secret("bearer-abc"));
        let debug = format!("{cred:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("bearer-abc"));
    }
}
