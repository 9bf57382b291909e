#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch-and-store pass for the snapshot collector.
//!
//! Each pass pulls the current station list from the live feed and writes
//! it as one snapshot. Scheduling lives in the binary; [`until_shutdown`]
//! lets a pass be abandoned when a shutdown signal arrives mid-tick.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use city_cycling_feed::{FeedClient, FetchError, FetchedStations};
use city_cycling_storage::{Deadline, SnapshotStore, StorageError};

/// Errors that can occur during one collection pass.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The feed could not be fetched or parsed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The snapshot could not be written.
    #[error("Store failed: {0}")]
    Storage(#[from] StorageError),
}

/// Writes an already-fetched station list, returning the new key.
///
/// # Errors
///
/// Returns [`StorageError`] if the write fails or `deadline` lapses.
pub async fn store_fetched(
    store: &dyn SnapshotStore,
    fetched: &FetchedStations,
    deadline: &Deadline,
) -> Result<String, StorageError> {
    deadline
        .run(
            "write_snapshot",
            store.write_snapshot(&fetched.stations, fetched.captured_at),
        )
        .await
}

/// Fetches the feed and stores the result as a new snapshot.
///
/// The feed request has its own client timeout; `deadline` bounds the
/// storage write.
///
/// # Errors
///
/// Returns [`CollectError`] if either the fetch or the write fails.
pub async fn collect_once(
    feed: &FeedClient,
    store: &dyn SnapshotStore,
    deadline: &Deadline,
) -> Result<String, CollectError> {
    let start = Instant::now();
    log::info!("Fetching station data from {}...", feed.endpoint());

    let fetched = feed.fetch_current_stations().await?;
    let key = store_fetched(store, &fetched, deadline).await?;

    log::info!(
        "Stored {} stations to {} as {key} in {:?}",
        fetched.stations.len(),
        store.describe(),
        start.elapsed()
    );

    Ok(key)
}

/// How a unit of work raced against shutdown ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Interruptible<T, S> {
    /// The work finished first.
    Completed(T),
    /// Shutdown fired first; the work was dropped.
    Interrupted(S),
}

/// Runs `work` until it completes or `shutdown` resolves, whichever is
/// first.
///
/// `shutdown` is borrowed so the same signal future can be polled again on
/// the next tick. Dropping a write part-way is safe: local writes land via
/// rename and object puts are atomic, so a snapshot is either whole or
/// absent.
pub async fn until_shutdown<W, S>(
    work: W,
    shutdown: Pin<&mut S>,
) -> Interruptible<W::Output, S::Output>
where
    W: Future,
    S: Future,
{
    tokio::select! {
        output = work => Interruptible::Completed(output),
        signal = shutdown => Interruptible::Interrupted(signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use city_cycling_station_models::Station;
    use city_cycling_storage::memory::MemorySnapshotStore;

    fn fetched() -> FetchedStations {
        FetchedStations {
            stations: vec![Station {
                id: 1,
                name: "River Street, Clerkenwell".to_string(),
                latitude: 51.529_163,
                longitude: -0.109_970,
                bike_count: 10,
                standard_bike_count: 8,
                e_bike_count: 2,
                empty_dock_count: 9,
                dock_count: 19,
            }],
            captured_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap(),
        }
    }

    #[tokio::test]
    async fn stored_snapshot_is_latest() {
        let store = MemorySnapshotStore::new();

        let key = store_fetched(&store, &fetched(), &Deadline::none())
            .await
            .unwrap();

        assert_eq!(key, "stations_20240301_123015.tsv");
        let latest = store.read_latest().await.unwrap();
        assert_eq!(latest.captured_at, fetched().captured_at);
        assert_eq!(latest.stations, fetched().stations);
    }

    #[tokio::test]
    async fn stored_snapshot_uses_store_prefix() {
        let store = MemorySnapshotStore::with_prefix("snapshots/");

        let key = store_fetched(&store, &fetched(), &Deadline::none())
            .await
            .unwrap();

        assert_eq!(key, "snapshots/stations_20240301_123015.tsv");
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_work() {
        let shutdown = async { "SIGTERM" };
        tokio::pin!(shutdown);

        let outcome = until_shutdown(std::future::pending::<()>(), shutdown.as_mut()).await;

        assert_eq!(outcome, Interruptible::Interrupted("SIGTERM"));
    }

    #[tokio::test]
    async fn completed_work_is_returned_before_shutdown() {
        let store = MemorySnapshotStore::new();
        let shutdown = std::future::pending::<&'static str>();
        tokio::pin!(shutdown);

        let outcome = until_shutdown(
            store_fetched(&store, &fetched(), &Deadline::none()),
            shutdown.as_mut(),
        )
        .await;

        assert!(matches!(
            outcome,
            Interruptible::Completed(Ok(ref key)) if key == "stations_20240301_123015.tsv"
        ));
        assert_eq!(store.list_keys().await.unwrap().len(), 1);
    }
}
