//! Local filesystem backend: one `.tsv` file per snapshot in a single
//! directory (non-recursive).
//!
//! A missing data directory means "no snapshots yet", not an error. Writes
//! go to a temporary file that is renamed into place, so readers never see
//! a partially written snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound as _, Utc};
use city_cycling_station_models::{Snapshot, Station};

use crate::naming::{SnapshotNaming, sort_newest_first};
use crate::{SnapshotStore, StorageError, codec, decode_snapshot};

/// Suffix for in-progress writes; never matches the snapshot naming scheme.
const TEMP_SUFFIX: &str = ".tmp";

/// Snapshot store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    data_dir: PathBuf,
    naming: SnapshotNaming,
}

impl LocalSnapshotStore {
    /// Creates a store rooted at `data_dir`. The directory is created lazily
    /// on first write.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            naming: SnapshotNaming::local(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full path of the file holding `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    fn naming(&self) -> &SnapshotNaming {
        &self.naming
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.data_dir.display())
    }

    async fn write_snapshot(
        &self,
        stations: &[Station],
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let captured_at = now.trunc_subsecs(0);
        let key = self.naming.name_for(captured_at);
        let body = codec::encode(stations, captured_at)
            .map_err(|e| StorageError::substrate("encode", e))?;

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StorageError::substrate("create_dir", e))?;

        let path = self.path_for(&key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::warn!(
                "Snapshot {key} already exists (two writes in the same second), overwriting"
            );
        }

        let temp_path = self.path_for(&format!("{key}{TEMP_SUFFIX}"));
        tokio::fs::write(&temp_path, &body)
            .await
            .map_err(|e| StorageError::substrate("write_snapshot", e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::substrate("write_snapshot", e))?;

        log::debug!(
            "Wrote {} stations ({} bytes) to {}",
            stations.len(),
            body.len(),
            path.display()
        );

        Ok(key)
    }

    async fn read_by_key(&self, key: &str) -> Result<Snapshot, StorageError> {
        // Also keeps arbitrary paths (`../`) out of the data directory.
        if !self.naming.is_snapshot_key(key) {
            return Err(StorageError::NotASnapshotKey {
                key: key.to_string(),
            });
        }

        let body = match tokio::fs::read(self.path_for(key)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(StorageError::substrate("read_by_key", e)),
        };

        decode_snapshot(&self.naming, key, &body)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();

        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "Data directory {} does not exist yet",
                    self.data_dir.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(StorageError::substrate("list_keys", e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::substrate("list_keys", e))?
        {
            let is_dir = entry.file_type().await.is_ok_and(|ft| ft.is_dir());
            if is_dir {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if self.naming.is_snapshot_key(name) => keys.push(name.to_string()),
                _ => {}
            }
        }

        sort_newest_first(&mut keys);

        log::debug!(
            "list_keys completed in {:?} (found {})",
            start.elapsed(),
            keys.len()
        );
        Ok(keys)
    }
}
