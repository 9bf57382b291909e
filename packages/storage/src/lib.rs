#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Snapshot storage for bike-share station data.
//!
//! A snapshot is a tab-separated capture of every station at one instant,
//! stored under a key that embeds its capture time (see [`naming`]). Keys
//! sort lexicographically in chronological order, so "latest" is simply the
//! greatest key and no separate index is kept.
//!
//! Backends implement [`SnapshotStore`]:
//!
//! - [`local::LocalSnapshotStore`] - one file per snapshot in a data directory
//! - `city_cycling_r2::R2SnapshotStore` - one object per snapshot in an
//!   S3-compatible bucket
//!
//! On top of the trait sit the [`history`] aggregator and the [`nearest`]
//! timestamp resolver. Both take a [`Deadline`] that bounds every substrate
//! call they make; nothing in this crate retries.

pub mod codec;
pub mod deadline;
pub mod history;
pub mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod naming;
pub mod nearest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use city_cycling_station_models::{Snapshot, Station};

pub use codec::CodecError;
pub use deadline::Deadline;
pub use naming::SnapshotNaming;

/// Errors that can occur during snapshot storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The named snapshot does not exist.
    #[error("Snapshot not found: {key}")]
    NotFound {
        /// Snapshot key that was requested.
        key: String,
    },

    /// `read_latest` was called on an empty snapshot set.
    #[error("No snapshots found")]
    NoSnapshotsFound,

    /// A timestamp lookup was attempted on an empty snapshot set.
    #[error("No snapshots available")]
    NoSnapshotsAvailable,

    /// Snapshots exist but none of their keys carried a parseable timestamp.
    #[error("No matching snapshot found for timestamp")]
    NoMatchFound,

    /// The snapshot exists but its body could not be decoded.
    #[error("Failed to decode snapshot {key}: {source}")]
    DecodeFailed {
        /// Snapshot key.
        key: String,
        /// Underlying codec error.
        source: CodecError,
    },

    /// The name does not follow the snapshot naming scheme.
    #[error("Not a snapshot key: {key}")]
    NotASnapshotKey {
        /// Offending name.
        key: String,
    },

    /// The storage substrate could not be reached or read.
    #[error("Storage unavailable during {operation}: {source}")]
    SubstrateUnavailable {
        /// Operation that failed (e.g. `"list_keys"`).
        operation: &'static str,
        /// Underlying I/O or SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The caller's deadline lapsed before the operation finished.
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was cut short.
        operation: &'static str,
    },
}

impl StorageError {
    /// Returns `true` for errors meaning "there is no such data", as opposed
    /// to a failing backend.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::NoSnapshotsFound
                | Self::NoSnapshotsAvailable
                | Self::NoMatchFound
        )
    }

    /// Wraps a substrate failure.
    pub fn substrate(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SubstrateUnavailable {
            operation,
            source: source.into(),
        }
    }
}

/// A storage backend holding the authoritative set of snapshots.
///
/// Snapshots are immutable once written and their keys are never reused,
/// which is what allows callers to cache reads indefinitely.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Naming scheme used for keys in this backend.
    fn naming(&self) -> &SnapshotNaming;

    /// Short human-readable description for log lines.
    fn describe(&self) -> String;

    /// Encodes `stations` captured at `now` and writes them under a new key,
    /// creating the parent container if needed.
    ///
    /// Returns the key that was written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SubstrateUnavailable`] if the write fails.
    async fn write_snapshot(
        &self,
        stations: &[Station],
        now: DateTime<Utc>,
    ) -> Result<String, StorageError>;

    /// Fetches and decodes a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the key does not exist and
    /// [`StorageError::DecodeFailed`] if its body is unreadable.
    async fn read_by_key(&self, key: &str) -> Result<Snapshot, StorageError>;

    /// Lists every snapshot key, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SubstrateUnavailable`] if enumeration fails.
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Reads the most recent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSnapshotsFound`] if there are no snapshots,
    /// or any error from [`Self::list_keys`] / [`Self::read_by_key`].
    async fn read_latest(&self) -> Result<Snapshot, StorageError> {
        let keys = self.list_keys().await?;
        let latest = keys.iter().max().ok_or(StorageError::NoSnapshotsFound)?;
        self.read_by_key(latest).await
    }

    /// Lists the capture instants of all snapshots, newest first.
    ///
    /// Timestamps come from the keys; no snapshot bodies are read.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::list_keys`].
    async fn list_timestamps(&self) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let keys = self.list_keys().await?;
        let naming = self.naming();
        Ok(keys
            .iter()
            .filter_map(|key| naming.timestamp_from(key).ok())
            .collect())
    }
}

/// Decodes a snapshot body read from `key`.
///
/// A snapshot with no station rows carries no timestamp in its body, so the
/// instant embedded in the key is used instead.
///
/// # Errors
///
/// Returns [`StorageError::DecodeFailed`] if the body has no header.
pub fn decode_snapshot(
    naming: &SnapshotNaming,
    key: &str,
    body: &[u8],
) -> Result<Snapshot, StorageError> {
    let mut snapshot = codec::decode(body).map_err(|source| StorageError::DecodeFailed {
        key: key.to_string(),
        source,
    })?;

    if snapshot.stations.is_empty() {
        if let Ok(ts) = naming.timestamp_from(key) {
            snapshot.captured_at = ts;
        }
    }

    Ok(snapshot)
}
