//! Nearest-timestamp lookup.
//!
//! Candidate timestamps are parsed from the keys, so only the winning
//! snapshot body is ever downloaded.

use chrono::{DateTime, TimeDelta, Utc};
use city_cycling_station_models::Snapshot;

use crate::{Deadline, SnapshotNaming, SnapshotStore, StorageError};

/// Picks the key whose timestamp is closest to `target`.
///
/// Ties go to the first candidate in `keys`. Since keys are listed newest
/// first, the more recent of two equidistant snapshots wins. Keys that don't
/// parse are skipped.
#[must_use]
pub fn nearest_key<'a>(
    naming: &SnapshotNaming,
    keys: &'a [String],
    target: DateTime<Utc>,
) -> Option<(&'a str, TimeDelta)> {
    let mut best: Option<(&'a str, TimeDelta)> = None;

    for key in keys {
        let ts = match naming.timestamp_from(key) {
            Ok(ts) => ts,
            Err(e) => {
                log::warn!("{e}");
                continue;
            }
        };

        let diff = (ts - target).abs();
        if best.is_none_or(|(_, best_diff)| diff < best_diff) {
            best = Some((key.as_str(), diff));
        }
    }

    best
}

/// Returns the snapshot captured closest to `target`.
///
/// # Errors
///
/// Returns [`StorageError::NoSnapshotsAvailable`] if there are no snapshots,
/// [`StorageError::NoMatchFound`] if no key carries a parseable timestamp,
/// or any listing/read error.
pub async fn find_nearest(
    store: &dyn SnapshotStore,
    target: DateTime<Utc>,
    deadline: &Deadline,
) -> Result<Snapshot, StorageError> {
    let keys = deadline.run("list_keys", store.list_keys()).await?;
    if keys.is_empty() {
        return Err(StorageError::NoSnapshotsAvailable);
    }

    let (key, diff) =
        nearest_key(store.naming(), &keys, target).ok_or(StorageError::NoMatchFound)?;
    log::debug!("find_nearest({target}) chose {key} (diff={diff})");

    deadline.run("read_by_key", store.read_by_key(key)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySnapshotStore;
    use crate::naming::sort_newest_first;
    use chrono::TimeZone;
    use city_cycling_station_models::Station;
    use std::time::Duration;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn keys_at(naming: &SnapshotNaming, offsets: &[i64]) -> Vec<String> {
        let mut keys: Vec<String> = offsets
            .iter()
            .map(|s| naming.name_for(base() + TimeDelta::seconds(*s)))
            .collect();
        sort_newest_first(&mut keys);
        keys
    }

    #[test]
    fn picks_closest_key() {
        let naming = SnapshotNaming::local();
        let keys = keys_at(&naming, &[0, 10, 30]);

        let (key, diff) = nearest_key(&naming, &keys, base() + TimeDelta::seconds(5)).unwrap();

        assert_eq!(key, naming.name_for(base()));
        assert_eq!(diff, TimeDelta::seconds(5));
    }

    #[test]
    fn midpoint_tie_goes_to_more_recent() {
        let naming = SnapshotNaming::local();
        let keys = keys_at(&naming, &[0, 10, 30]);

        let (key, _) = nearest_key(&naming, &keys, base() + TimeDelta::seconds(20)).unwrap();

        assert_eq!(key, naming.name_for(base() + TimeDelta::seconds(30)));
    }

    #[test]
    fn targets_outside_range_clamp_to_ends() {
        let naming = SnapshotNaming::local();
        let keys = keys_at(&naming, &[0, 10, 30]);

        let (before, _) = nearest_key(&naming, &keys, base() - TimeDelta::hours(1)).unwrap();
        let (after, _) = nearest_key(&naming, &keys, base() + TimeDelta::days(2)).unwrap();

        assert_eq!(before, naming.name_for(base()));
        assert_eq!(after, naming.name_for(base() + TimeDelta::seconds(30)));
    }

    #[test]
    fn unparseable_keys_yield_none() {
        let naming = SnapshotNaming::local();
        let keys = vec!["garbage.tsv".to_string(), "stations_x.tsv".to_string()];
        assert!(nearest_key(&naming, &keys, base()).is_none());
    }

    #[tokio::test]
    async fn empty_store_is_no_snapshots_available() {
        let store = MemorySnapshotStore::new();
        assert!(matches!(
            find_nearest(&store, base(), &Deadline::none()).await,
            Err(StorageError::NoSnapshotsAvailable)
        ));
    }

    #[tokio::test]
    async fn reads_only_the_winning_snapshot() {
        let store = MemorySnapshotStore::new();
        for (offset, bikes) in [(0, 1), (10, 2), (30, 3)] {
            let station = Station {
                id: 1,
                name: "Dock".to_string(),
                latitude: 51.5,
                longitude: -0.1,
                bike_count: bikes,
                standard_bike_count: bikes,
                e_bike_count: 0,
                empty_dock_count: 0,
                dock_count: bikes,
            };
            store
                .write_snapshot(&[station], base() + TimeDelta::seconds(offset))
                .await
                .unwrap();
        }

        let snapshot = find_nearest(&store, base() + TimeDelta::seconds(12), &Deadline::none())
            .await
            .unwrap();

        assert_eq!(snapshot.stations[0].bike_count, 2);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn lapsed_deadline_surfaces_as_deadline_exceeded() {
        let store = MemorySnapshotStore::new();
        store.write_snapshot(&[], base()).await.unwrap();
        store.set_read_delay(Duration::from_secs(60));

        let result = find_nearest(
            &store,
            base(),
            &Deadline::after(Duration::from_millis(10)),
        )
        .await;

        assert!(matches!(
            result,
            Err(StorageError::DeadlineExceeded {
                operation: "read_by_key"
            })
        ));
    }
}
