//! Atomic JSON file persistence
//!
//! Every durable store in the workspace keeps its rows in memory behind a
//! lock and rewrites the whole file on mutation. Writes go to a temp file in
//! the same directory and are renamed over the target, so a crash mid-write
//! never leaves a truncated file behind.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Load a JSON document from `path`, or create it from `T::default()`.
///
/// A missing file is a cold start: the default value is written so later
/// loads take the normal path.
pub async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if tokio::fs::try_exists(path).await? {
        let contents = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(|source| Error::Json {
            path: path.display().to_string(),
            source,
        })
    } else {
        info!(path = %path.display(), "store file not found, starting empty");
        let value = T::default();
        write_json_atomic(path, &value).await?;
        Ok(value)
    }
}

/// Write `value` as pretty JSON to `path` atomically.
///
/// File permissions are set to 0600 (owner read/write only) since several
/// stores hold client secrets or bearer tokens.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.display().to_string(),
        source,
    })?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("store path has no file name: {}", path.display())))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), "persisted store file");
    Ok(())
}
