#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the city cycling server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the storage types so the wire contract (field names, timestamp
//! format) can evolve independently.

use chrono::{DateTime, Utc};
use city_cycling_station_models::{HistoricalDataPoint, Station};
use serde::{Deserialize, Serialize};

/// Formats an instant for API responses (`2024-03-01T12:00:00Z`).
#[must_use]
pub fn api_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    pub healthy: bool,
    pub version: String,
}

/// Error body returned alongside non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
}

/// A docking station as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStation {
    /// Upstream station ID.
    pub id: i64,
    /// Station name.
    pub name: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Total bikes docked.
    pub nb_bikes: u32,
    /// Standard bikes docked.
    pub nb_standard_bikes: u32,
    /// Electric bikes docked.
    #[serde(rename = "nbEBikes")]
    pub nb_e_bikes: u32,
    /// Free docks.
    pub nb_empty_docks: u32,
    /// Total docks.
    pub nb_docks: u32,
}

impl From<&Station> for ApiStation {
    fn from(s: &Station) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            lat: s.latitude,
            lng: s.longitude,
            nb_bikes: s.bike_count,
            nb_standard_bikes: s.standard_bike_count,
            nb_e_bikes: s.e_bike_count,
            nb_empty_docks: s.empty_dock_count,
            nb_docks: s.dock_count,
        }
    }
}

/// Response for `/api/stations` and `/api/history/snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStations {
    /// Snapshot instant (or the requested instant for historical lookups).
    pub timestamp: String,
    pub stations: Vec<ApiStation>,
}

impl ApiStations {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, stations: &[Station]) -> Self {
        Self {
            timestamp: api_timestamp(timestamp),
            stations: stations.iter().map(ApiStation::from).collect(),
        }
    }
}

/// One point of the aggregate history series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHistoryPoint {
    pub timestamp: String,
    pub total_bikes: u64,
    #[serde(rename = "totalEBikes")]
    pub total_e_bikes: u64,
    pub total_empty_docks: u64,
    pub station_count: usize,
}

impl From<&HistoricalDataPoint> for ApiHistoryPoint {
    fn from(p: &HistoricalDataPoint) -> Self {
        Self {
            timestamp: api_timestamp(p.timestamp),
            total_bikes: p.total_bikes,
            total_e_bikes: p.total_e_bikes,
            total_empty_docks: p.total_empty_docks,
            station_count: p.station_count,
        }
    }
}

/// Response for `/api/history`. Points are newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHistory {
    pub data_points: Vec<ApiHistoryPoint>,
}

/// Response for `/api/timestamps`. Newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTimestamps {
    pub timestamps: Vec<String>,
}

/// Query parameters for `/api/history/snapshot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotQueryParams {
    /// Target instant, RFC 3339.
    pub timestamp: Option<String>,
}
