//! Aggregate series over the whole snapshot history.

use std::time::Instant;

use city_cycling_station_models::HistoricalDataPoint;

use crate::{Deadline, SnapshotStore, StorageError};

/// Reads every snapshot and summarizes it into one [`HistoricalDataPoint`].
///
/// Points come back in the order of [`SnapshotStore::list_keys`], i.e.
/// newest first; reverse the result for a chronological series. A snapshot
/// that fails to read or decode is logged and left out rather than failing
/// the whole series.
///
/// # Errors
///
/// Returns an error if listing fails or `deadline` lapses.
pub async fn compute_series(
    store: &dyn SnapshotStore,
    deadline: &Deadline,
) -> Result<Vec<HistoricalDataPoint>, StorageError> {
    let start = Instant::now();

    let keys = deadline.run("list_keys", store.list_keys()).await?;
    let mut points = Vec::with_capacity(keys.len());

    for key in &keys {
        match deadline.run("read_by_key", store.read_by_key(key)).await {
            Ok(snapshot) => points.push(snapshot.summarize()),
            Err(e @ StorageError::DeadlineExceeded { .. }) => return Err(e),
            Err(e) => log::warn!("Skipping snapshot {key}: {e}"),
        }
    }

    log::info!(
        "compute_series completed in {:?} ({} of {} snapshots from {})",
        start.elapsed(),
        points.len(),
        keys.len(),
        store.describe()
    );

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySnapshotStore;
    use chrono::{TimeZone, Utc};
    use city_cycling_station_models::Station;
    use std::time::Duration;

    fn station(bikes: u32, e_bikes: u32, empty: u32) -> Station {
        Station {
            id: 1,
            name: "Dock".to_string(),
            latitude: 51.5,
            longitude: -0.1,
            bike_count: bikes,
            standard_bike_count: bikes - e_bikes,
            e_bike_count: e_bikes,
            empty_dock_count: empty,
            dock_count: bikes + empty,
        }
    }

    #[tokio::test]
    async fn skips_corrupt_snapshots() {
        let store = MemorySnapshotStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();

        store
            .write_snapshot(&[station(4, 1, 6), station(2, 2, 8)], t0)
            .await
            .unwrap();
        store.insert_raw("stations_20240301_120500.tsv", "");
        store
            .write_snapshot(&[station(1, 0, 9)], t2)
            .await
            .unwrap();

        let series = compute_series(&store, &Deadline::none()).await.unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, t2);
        assert_eq!(series[0].total_bikes, 1);
        assert_eq!(series[0].station_count, 1);
        assert_eq!(series[1].timestamp, t0);
        assert_eq!(series[1].total_bikes, 6);
        assert_eq!(series[1].total_e_bikes, 3);
        assert_eq!(series[1].total_empty_docks, 14);
        assert_eq!(series[1].station_count, 2);
    }

    #[tokio::test]
    async fn lapsed_deadline_aborts_the_series() {
        let store = MemorySnapshotStore::new();
        for minute in [0, 5] {
            let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap();
            store.write_snapshot(&[station(3, 1, 7)], ts).await.unwrap();
        }
        store.set_read_delay(Duration::from_secs(60));

        let result =
            compute_series(&store, &Deadline::after(Duration::from_millis(10))).await;

        assert!(matches!(
            result,
            Err(StorageError::DeadlineExceeded {
                operation: "read_by_key"
            })
        ));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_series() {
        let store = MemorySnapshotStore::new();
        let series = compute_series(&store, &Deadline::none()).await.unwrap();
        assert!(series.is_empty());
    }
}
