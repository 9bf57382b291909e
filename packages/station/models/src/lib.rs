#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Bike-share station and snapshot value types.
//!
//! These types are shared by the feed client, the storage layer, and the
//! server. A [`Snapshot`] is immutable once written; every station in it
//! shares the snapshot's capture instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single docking station as reported by the upstream feed.
///
/// No invariant is enforced across the counts: the feed occasionally
/// reports sums that don't add up, and those values are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Stable identifier from the upstream feed.
    pub id: i64,
    /// Human-readable station name.
    pub name: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Total bikes currently docked.
    pub bike_count: u32,
    /// Standard (non-electric) bikes docked.
    pub standard_bike_count: u32,
    /// Electric bikes docked.
    pub e_bike_count: u32,
    /// Free docks.
    pub empty_dock_count: u32,
    /// Total docks at the station.
    pub dock_count: u32,
}

/// One capture of every station at a single instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Capture instant (UTC, second precision).
    pub captured_at: DateTime<Utc>,
    /// Stations in feed order.
    pub stations: Vec<Station>,
}

impl Snapshot {
    #[must_use]
    pub const fn new(captured_at: DateTime<Utc>, stations: Vec<Station>) -> Self {
        Self {
            captured_at,
            stations,
        }
    }

    /// Sums the snapshot's station counters into a single data point.
    #[must_use]
    pub fn summarize(&self) -> HistoricalDataPoint {
        let mut point = HistoricalDataPoint {
            timestamp: self.captured_at,
            total_bikes: 0,
            total_e_bikes: 0,
            total_empty_docks: 0,
            station_count: self.stations.len(),
        };

        for station in &self.stations {
            point.total_bikes += u64::from(station.bike_count);
            point.total_e_bikes += u64::from(station.e_bike_count);
            point.total_empty_docks += u64::from(station.empty_dock_count);
        }

        point
    }
}

/// Aggregate statistics for one snapshot.
///
/// Derived, never stored: recomputed from snapshots on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalDataPoint {
    /// Capture instant of the source snapshot.
    pub timestamp: DateTime<Utc>,
    /// Sum of `bike_count` across stations.
    pub total_bikes: u64,
    /// Sum of `e_bike_count` across stations.
    pub total_e_bikes: u64,
    /// Sum of `empty_dock_count` across stations.
    pub total_empty_docks: u64,
    /// Number of stations in the snapshot.
    pub station_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn station(id: i64, bikes: u32, e_bikes: u32, empty: u32) -> Station {
        Station {
            id,
            name: format!("Station {id}"),
            latitude: 51.5,
            longitude: -0.12,
            bike_count: bikes,
            standard_bike_count: bikes.saturating_sub(e_bikes),
            e_bike_count: e_bikes,
            empty_dock_count: empty,
            dock_count: bikes + empty,
        }
    }

    #[test]
    fn summarize_sums_counters() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new(ts, vec![station(1, 5, 2, 10), station(2, 3, 0, 4)]);

        let point = snapshot.summarize();

        assert_eq!(point.timestamp, ts);
        assert_eq!(point.total_bikes, 8);
        assert_eq!(point.total_e_bikes, 2);
        assert_eq!(point.total_empty_docks, 14);
        assert_eq!(point.station_count, 2);
    }

    #[test]
    fn summarize_empty_snapshot() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let point = Snapshot::new(ts, Vec::new()).summarize();

        assert_eq!(point.total_bikes, 0);
        assert_eq!(point.station_count, 0);
    }
}
