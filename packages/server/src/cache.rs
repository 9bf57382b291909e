//! In-memory result caches shared by request handlers.
//!
//! Both caches are check-then-fill-then-store: a read lock to look, the
//! expensive storage work with no lock held, then a write lock only to
//! install the result. Two concurrent misses may both compute; the later
//! store wins, which is harmless because snapshots never change.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use city_cycling_station_models::{HistoricalDataPoint, Station};

/// Default freshness window for the aggregate series.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(10 * 60);

struct CachedSeries {
    points: Arc<Vec<HistoricalDataPoint>>,
    computed_at: Instant,
}

/// Single-slot cache for the aggregate history series.
pub struct HistoryCache {
    ttl: Duration,
    slot: RwLock<Option<CachedSeries>>,
}

impl HistoryCache {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached series if it was computed less than `ttl` ago.
    #[must_use]
    pub fn get_fresh(&self) -> Option<Arc<Vec<HistoricalDataPoint>>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|cached| cached.computed_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.points))
    }

    /// Replaces the cached series.
    pub fn store(&self, points: Vec<HistoricalDataPoint>) -> Arc<Vec<HistoricalDataPoint>> {
        let points = Arc::new(points);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CachedSeries {
            points: Arc::clone(&points),
            computed_at: Instant::now(),
        });
        points
    }

    /// Returns the fresh cached series, or runs `compute` and caches its
    /// output. Errors are not cached.
    ///
    /// # Errors
    ///
    /// Propagates any error from `compute`.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        compute: F,
    ) -> Result<Arc<Vec<HistoricalDataPoint>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<HistoricalDataPoint>, E>>,
    {
        if let Some(points) = self.get_fresh() {
            log::debug!("History cache hit ({} data points)", points.len());
            return Ok(points);
        }

        let points = self.store(compute().await?);
        log::info!("History cache updated ({} data points)", points.len());
        Ok(points)
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TTL)
    }
}

/// Per-timestamp station lists, keyed by the normalized request timestamp.
///
/// Entries are never evicted. Growth is bounded only by the number of
/// distinct timestamps ever requested.
#[derive(Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, Arc<Vec<Station>>>>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Vec<Station>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, stations: Vec<Station>) -> Arc<Vec<Station>> {
        let stations = Arc::new(stations);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&stations));
        stations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached stations for `key`, or runs `fetch` and caches
    /// its output. Errors are not cached.
    ///
    /// # Errors
    ///
    /// Propagates any error from `fetch`.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<Arc<Vec<Station>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Station>, E>>,
    {
        if let Some(stations) = self.get(key) {
            log::debug!("Snapshot cache hit for {key} ({} stations)", stations.len());
            return Ok(stations);
        }

        let stations = self.insert(key.to_string(), fetch().await?);
        log::info!(
            "Snapshot cache updated for {key} ({} stations)",
            stations.len()
        );
        Ok(stations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use city_cycling_storage::memory::MemorySnapshotStore;
    use city_cycling_storage::{Deadline, SnapshotStore, StorageError, history, nearest};

    fn station(id: i64, bikes: u32) -> Station {
        Station {
            id,
            name: format!("Dock {id}"),
            latitude: 51.5,
            longitude: -0.1,
            bike_count: bikes,
            standard_bike_count: bikes,
            e_bike_count: 0,
            empty_dock_count: 10,
            dock_count: 10 + bikes,
        }
    }

    async fn seeded_store() -> MemorySnapshotStore {
        let store = MemorySnapshotStore::new();
        for (minute, bikes) in [(0, 3), (5, 4), (10, 5)] {
            let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap();
            store
                .write_snapshot(&[station(1, bikes), station(2, 1)], ts)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn fresh_series_is_not_recomputed() {
        let store = seeded_store().await;
        let cache = HistoryCache::new(Duration::from_secs(600));
        let deadline = Deadline::none();

        let first = cache
            .get_or_compute(|| history::compute_series(&store, &deadline))
            .await
            .unwrap();
        let second = cache
            .get_or_compute(|| history::compute_series(&store, &deadline))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.list_count(), 1);
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn stale_series_is_recomputed() {
        let store = seeded_store().await;
        let cache = HistoryCache::new(Duration::ZERO);
        let deadline = Deadline::none();

        cache
            .get_or_compute(|| history::compute_series(&store, &deadline))
            .await
            .unwrap();
        cache
            .get_or_compute(|| history::compute_series(&store, &deadline))
            .await
            .unwrap();

        assert_eq!(store.list_count(), 2);
    }

    #[tokio::test]
    async fn failed_compute_leaves_cache_empty() {
        let cache = HistoryCache::default();

        let result = cache
            .get_or_compute(|| async {
                Err::<Vec<HistoricalDataPoint>, _>(StorageError::NoSnapshotsFound)
            })
            .await;

        assert!(matches!(result, Err(StorageError::NoSnapshotsFound)));
        assert!(cache.get_fresh().is_none());
    }

    #[tokio::test]
    async fn repeated_timestamp_reads_substrate_once() {
        let store = seeded_store().await;
        let cache = SnapshotCache::new();
        let deadline = Deadline::none();
        let target = Utc.with_ymd_and_hms(2024, 3, 1, 12, 4, 0).unwrap();

        for _ in 0..3 {
            let stations = cache
                .get_or_fetch("2024-03-01T12:04:00Z", || async {
                    nearest::find_nearest(&store, target, &deadline)
                        .await
                        .map(|snapshot| snapshot.stations)
                })
                .await
                .unwrap();
            assert_eq!(stations[0].bike_count, 4);
        }

        assert_eq!(store.read_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = SnapshotCache::new();

        let result = cache
            .get_or_fetch("2024-03-01T12:00:00Z", || async {
                Err::<Vec<Station>, _>(StorageError::NoSnapshotsAvailable)
            })
            .await;

        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
