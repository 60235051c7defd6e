//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Client secrets are loaded from the env var or file named by each
//! `[[credentials]]` entry, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use osu_pool::{PoolLimits, RetryPolicy};
use serde::Deserialize;

use crate::error::Error;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

/// Upstream endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token_url: String,
    pub api_base: String,
    pub scope: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_url: osu_auth::TOKEN_ENDPOINT.to_string(),
            api_base: osu_auth::API_BASE.to_string(),
            scope: osu_auth::DEFAULT_SCOPE.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Per-credential quota, circuit breaker and retry settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub rate_limit: u32,
    pub window_secs: u64,
    pub error_threshold: usize,
    pub error_window_secs: u64,
    pub max_retries: u32,
    pub base_wait_secs: u64,
    pub prefer_delegated_tokens: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rate_limit: 60,
            window_secs: 60,
            error_threshold: 3,
            error_window_secs: 900,
            max_retries: 12,
            base_wait_secs: 5,
            prefer_delegated_tokens: false,
        }
    }
}

impl PoolConfig {
    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            rate_limit: self.rate_limit,
            window: Duration::from_secs(self.window_secs),
            error_threshold: self.error_threshold,
            error_window: Duration::from_secs(self.error_window_secs),
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_wait: Duration::from_secs(self.base_wait_secs),
        }
    }
}

/// Batch scheduling
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub max_workers: usize,
    pub cycle_interval_secs: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            cycle_interval_secs: 30,
        }
    }
}

/// Paths of the durable JSON stores
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub credentials_path: PathBuf,
    pub players_path: PathBuf,
    pub performance_path: PathBuf,
    pub delegated_tokens_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            players_path: PathBuf::from("players.json"),
            performance_path: PathBuf::from("performance.json"),
            delegated_tokens_path: None,
        }
    }
}

/// Status listener
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub listen_addr: SocketAddr,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9100)),
        }
    }
}

/// One API application as configured
#[derive(Debug, Deserialize)]
pub struct CredentialConfig {
    pub name: String,
    pub client_id: String,
    /// Name of the env var holding the client secret
    #[serde(default)]
    pub client_secret_env: Option<String>,
    /// Path to a file containing the client secret
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

impl CredentialConfig {
    /// Resolve the client secret: env var first, then file.
    pub fn resolve_secret(&self) -> Result<Secret<String>, Error> {
        if let Some(var) = &self.client_secret_env {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim().to_owned();
                if !value.is_empty() {
                    return Ok(Secret::new(value));
                }
            }
        }
        if let Some(file) = &self.client_secret_file {
            let value = std::fs::read_to_string(file).map_err(|e| Error::MissingSecret {
                credential: self.name.clone(),
                reason: format!("failed to read {}: {e}", file.display()),
            })?;
            let value = value.trim().to_owned();
            if !value.is_empty() {
                return Ok(Secret::new(value));
            }
        }
        Err(Error::MissingSecret {
            credential: self.name.clone(),
            reason: "neither client_secret_env nor client_secret_file resolved".into(),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("token_url", &self.api.token_url),
            ("api_base", &self.api.api_base),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        let non_zero = [
            ("timeout_secs", self.api.timeout_secs == 0),
            ("max_workers", self.updater.max_workers == 0),
            ("rate_limit", self.pool.rate_limit == 0),
            ("max_retries", self.pool.max_retries == 0),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, zero)| *zero) {
            return Err(common::Error::Config(format!(
                "{field} must be greater than 0"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for credential in &self.credentials {
            if !seen.insert(credential.name.as_str()) {
                return Err(common::Error::Config(format!(
                    "duplicate credential name: {}",
                    credential.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("stats-updater.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("stats-updater.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, "")).unwrap();

        assert_eq!(config.api.token_url, "https://osu.ppy.sh/oauth/token");
        assert_eq!(config.api.api_base, "https://osu.ppy.sh/api/v2");
        assert_eq!(config.api.scope, "public");
        assert_eq!(config.pool.rate_limit, 60);
        assert_eq!(config.pool.error_threshold, 3);
        assert_eq!(config.pool.error_window_secs, 900);
        assert_eq!(config.pool.max_retries, 12);
        assert_eq!(config.updater.max_workers, 8);
        assert_eq!(config.updater.cycle_interval_secs, 30);
        assert_eq!(config.status.listen_addr.port(), 9100);
        assert!(config.storage.delegated_tokens_path.is_none());
        assert!(config.credentials.is_empty());
        assert!(!config.pool.prefer_delegated_tokens);
    }

    #[test]
    fn full_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(
            &dir,
            r#"
[api]
api_base = "http://127.0.0.1:9000/api/v2"
timeout_secs = 3

[pool]
rate_limit = 30
base_wait_secs = 1
prefer_delegated_tokens = true

[updater]
max_workers = 2

[storage]
players_path = "/data/players.json"
delegated_tokens_path = "/data/user-tokens.json"

[status]
listen_addr = "0.0.0.0:9200"

[[credentials]]
name = "primary"
client_id = "111"
client_secret_env = "PRIMARY_SECRET"

[[credentials]]
name = "backup"
client_id = "222"
client_secret_file = "/run/secrets/backup"
"#,
        ))
        .unwrap();

        assert_eq!(config.api.timeout_secs, 3);
        assert_eq!(config.pool.limits().rate_limit, 30);
        assert_eq!(config.pool.retry().base_wait, Duration::from_secs(1));
        assert_eq!(config.pool.retry().max_retries, 12);
        assert!(config.pool.prefer_delegated_tokens);
        assert_eq!(config.updater.max_workers, 2);
        assert_eq!(config.storage.players_path, PathBuf::from("/data/players.json"));
        assert_eq!(config.storage.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(config.status.listen_addr.port(), 9200);
        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.credentials[1].client_id, "222");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/path/config.toml")).is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&write_config(&dir, "not valid {{{{ toml")).is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(&dir, "[api]\napi_base = \"ftp://nope\"\n"))
            .unwrap_err();
        assert!(err.to_string().contains("api_base"), "got: {err}");
    }

    #[test]
    fn rejects_zero_values() {
        let dir = tempfile::tempdir().unwrap();
        for toml in [
            "[api]\ntimeout_secs = 0\n",
            "[updater]\nmax_workers = 0\n",
            "[pool]\nrate_limit = 0\n",
            "[pool]\nmax_retries = 0\n",
        ] {
            let err = Config::load(&write_config(&dir, toml)).unwrap_err();
            assert!(
                err.to_string().contains("must be greater than 0"),
                "{toml} -> {err}"
            );
        }
    }

    #[test]
    fn rejects_duplicate_credential_names() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write_config(
            &dir,
            r#"
[[credentials]]
name = "a"
client_id = "1"

[[credentials]]
name = "a"
client_id = "2"
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    fn credential(env: Option<&str>, file: Option<PathBuf>) -> CredentialConfig {
        CredentialConfig {
            name: "primary".into(),
            client_id: "111".into(),
            client_secret_env: env.map(str::to_string),
            client_secret_file: file,
        }
    }

    #[test]
    fn secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("STATS_TEST_SECRET_ENV", "from-env") };
        let secret = credential(Some("STATS_TEST_SECRET_ENV"), None)
            .resolve_secret()
            .unwrap();
        assert_eq!(secret.expose(), "from-env");
        unsafe { remove_env("STATS_TEST_SECRET_ENV") };
    }

    #[test]
    fn secret_from_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file\n").unwrap();

        let secret = credential(None, Some(path)).resolve_secret().unwrap();
        assert_eq!(secret.expose(), "from-file");
    }

    #[test]
    fn secret_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file").unwrap();

        unsafe { set_env("STATS_TEST_SECRET_BOTH", "from-env") };
        let secret = credential(Some("STATS_TEST_SECRET_BOTH"), Some(path))
            .resolve_secret()
            .unwrap();
        assert_eq!(secret.expose(), "from-env");
        unsafe { remove_env("STATS_TEST_SECRET_BOTH") };
    }

    #[test]
    fn unresolvable_secret_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("STATS_TEST_SECRET_UNSET") };
        let err = credential(Some("STATS_TEST_SECRET_UNSET"), None)
            .resolve_secret()
            .unwrap_err();
        assert!(matches!(err, Error::MissingSecret { .. }), "got: {err:?}");
    }

    #[test]
    fn resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("stats-updater.toml"));
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }
}
