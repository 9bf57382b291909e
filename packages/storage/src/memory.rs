//! In-memory [`SnapshotStore`] for tests.
//!
//! Counts reads and listings so callers can assert how often the substrate
//! was actually touched (e.g. by a cache). Reads can be slowed down to
//! exercise deadlines.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound as _, Utc};
use city_cycling_station_models::{Snapshot, Station};

use crate::naming::SnapshotNaming;
use crate::{SnapshotStore, StorageError, codec, decode_snapshot};

/// Snapshot store holding raw bodies in a map.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    naming: SnapshotNaming,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    reads: AtomicUsize,
    lists: AtomicUsize,
    read_delay_ms: AtomicU64,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose keys start with `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            naming: SnapshotNaming::new(prefix),
            ..Self::default()
        }
    }

    /// Stores a raw body under `key`, bypassing the codec.
    pub fn insert_raw(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), body.into());
    }

    /// Makes every subsequent `read_by_key` sleep for `delay` first.
    pub fn set_read_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.read_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of `read_by_key` calls so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `list_keys` calls so far.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn naming(&self) -> &SnapshotNaming {
        &self.naming
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
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
        self.insert_raw(key.clone(), body);
        Ok(key)
    }

    async fn read_by_key(&self, key: &str) -> Result<Snapshot, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let body = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        decode_snapshot(&self.naming, key, &body)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .rev()
            .filter(|key| self.naming.is_snapshot_key(key))
            .cloned()
            .collect())
    }
}
