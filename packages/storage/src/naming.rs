//! Snapshot key scheme: `<prefix>stations_<YYYYMMDD>_<HHMMSS>.tsv`.
//!
//! The timestamp is zero-padded UTC, so reverse lexicographic order over
//! keys is reverse chronological order. Resolution is one second: two
//! writes in the same second produce the same key and the later one wins.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::StorageError;

/// Fixed stem preceding the timestamp.
pub const KEY_STEM: &str = "stations_";

/// Fixed suffix following the timestamp.
pub const KEY_EXTENSION: &str = ".tsv";

/// Default object-store key prefix.
pub const DEFAULT_OBJECT_PREFIX: &str = "snapshots/";

const KEY_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const KEY_TIME_LEN: usize = 15;

/// Derives snapshot keys from capture instants and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotNaming {
    prefix: String,
}

impl SnapshotNaming {
    /// Creates a naming scheme whose keys start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Naming for local files, where the key is the bare filename.
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the key for a snapshot captured at `captured_at`.
    #[must_use]
    pub fn name_for(&self, captured_at: DateTime<Utc>) -> String {
        format!(
            "{}{KEY_STEM}{}{KEY_EXTENSION}",
            self.prefix,
            captured_at.format(KEY_TIME_FORMAT)
        )
    }

    /// Recovers the capture instant embedded in `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotASnapshotKey`] if `key` lacks the prefix,
    /// stem, or extension, or its timestamp portion doesn't parse.
    pub fn timestamp_from(&self, key: &str) -> Result<DateTime<Utc>, StorageError> {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(KEY_STEM))
            .and_then(|rest| rest.strip_suffix(KEY_EXTENSION))
            .filter(|ts| ts.len() == KEY_TIME_LEN)
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, KEY_TIME_FORMAT).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| StorageError::NotASnapshotKey {
                key: key.to_string(),
            })
    }

    /// Returns `true` if `key` follows this naming scheme.
    #[must_use]
    pub fn is_snapshot_key(&self, key: &str) -> bool {
        self.timestamp_from(key).is_ok()
    }
}

/// Sorts keys newest first.
pub fn sort_newest_first(keys: &mut [String]) {
    keys.sort_unstable_by(|a, b| b.cmp(a));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_key_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(
            SnapshotNaming::local().name_for(ts),
            "stations_20240301_090507.tsv"
        );
    }

    #[test]
    fn prefixed_key_format() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            SnapshotNaming::new(DEFAULT_OBJECT_PREFIX).name_for(ts),
            "snapshots/stations_20241231_235959.tsv"
        );
    }

    #[test]
    fn name_and_parse_are_inverse() {
        let naming = SnapshotNaming::new("snapshots/");
        for ts in [
            Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 34, 56).unwrap(),
            Utc.with_ymd_and_hms(2038, 1, 19, 3, 14, 8).unwrap(),
        ] {
            assert_eq!(naming.timestamp_from(&naming.name_for(ts)).unwrap(), ts);
        }
    }

    #[test]
    fn rejects_non_snapshot_names() {
        let naming = SnapshotNaming::new("snapshots/");
        for key in [
            "stations_20240301_090507.tsv",
            "snapshots/stations_20240301_090507.csv",
            "snapshots/stations_20240301.tsv",
            "snapshots/stations_2024030x_090507.tsv",
            "snapshots/stations_20241301_090507.tsv",
            "snapshots/readme.txt",
            "",
        ] {
            assert!(
                matches!(
                    naming.timestamp_from(key),
                    Err(StorageError::NotASnapshotKey { .. })
                ),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn descending_key_order_is_descending_time() {
        let naming = SnapshotNaming::local();
        let times = [
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 1).unwrap(),
        ];

        let mut keys: Vec<String> = times.iter().map(|ts| naming.name_for(*ts)).collect();
        sort_newest_first(&mut keys);

        let parsed: Vec<_> = keys
            .iter()
            .map(|k| naming.timestamp_from(k).unwrap())
            .collect();
        let mut expected = times.to_vec();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(parsed, expected);
    }
}
