#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client for the TfL cycle hire live station feed.
//!
//! The feed is a single XML document listing every docking station with its
//! current bike and dock counts. Network, HTTP status, and parse failures
//! all surface as one [`FetchError`]; retry policy belongs to the caller.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use city_cycling_station_models::Station;
use serde::Deserialize;

/// TfL Santander Cycles live update feed.
pub const DEFAULT_ENDPOINT: &str =
    "https://tfl.gov.uk/tfl/syndication/feeds/cycle-hire/livecyclehireupdates.xml";

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "city-cycling/1.0";

/// Errors that can occur while fetching the feed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection failure, timeout, or body read error.
    #[error("Failed to fetch stations: {0}")]
    Request(#[from] reqwest::Error),

    /// The feed answered with a non-200 status.
    #[error("Unexpected status code: {0}")]
    Status(reqwest::StatusCode),

    /// The body was not a valid station document.
    #[error("Failed to parse XML: {0}")]
    Parse(#[from] quick_xml::de::DeError),
}

/// Stations returned by one fetch, with the instant they were received.
#[derive(Debug, Clone)]
pub struct FetchedStations {
    pub stations: Vec<Station>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(rename = "station", default)]
    stations: Vec<FeedStation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedStation {
    id: i64,
    name: String,
    lat: f64,
    long: f64,
    #[serde(default)]
    nb_bikes: u32,
    #[serde(default)]
    nb_standard_bikes: u32,
    #[serde(rename = "nbEBikes", default)]
    nb_e_bikes: u32,
    #[serde(default)]
    nb_empty_docks: u32,
    #[serde(default)]
    nb_docks: u32,
}

impl From<FeedStation> for Station {
    fn from(s: FeedStation) -> Self {
        Self {
            id: s.id,
            name: s.name,
            latitude: s.lat,
            longitude: s.long,
            bike_count: s.nb_bikes,
            standard_bike_count: s.nb_standard_bikes,
            e_bike_count: s.nb_e_bikes,
            empty_dock_count: s.nb_empty_docks,
            dock_count: s.nb_docks,
        }
    }
}

/// HTTP client for the station feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    endpoint: String,
    client: reqwest::Client,
}

impl FeedClient {
    /// Creates a client for [`DEFAULT_ENDPOINT`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the HTTP client can't be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Creates a client for a custom feed URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the HTTP client can't be built.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches and parses the current station list.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, a non-200 response, or an
    /// unparseable body.
    pub async fn fetch_current_stations(&self) -> Result<FetchedStations, FetchError> {
        let start = Instant::now();

        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let captured_at = Utc::now();
        let stations = parse_feed(&body)?;

        log::debug!(
            "Fetched {} stations from {} in {:?}",
            stations.len(),
            self.endpoint,
            start.elapsed()
        );

        Ok(FetchedStations {
            stations,
            captured_at,
        })
    }
}

/// Parses a feed document into stations, in document order.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] if the XML is malformed or a station is
/// missing its id, name, or coordinates.
pub fn parse_feed(xml: &str) -> Result<Vec<Station>, FetchError> {
    let document: FeedDocument = quick_xml::de::from_str(xml)?;
    Ok(document.stations.into_iter().map(Station::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<stations lastUpdate="1709294400000" version="2.0">
  <station>
    <id>1</id>
    <name>River Street , Clerkenwell</name>
    <terminalName>001023</terminalName>
    <lat>51.52916347</lat>
    <long>-0.109970527</long>
    <installed>true</installed>
    <locked>false</locked>
    <installDate>1278947280000</installDate>
    <removalDate/>
    <temporary>false</temporary>
    <nbBikes>10</nbBikes>
    <nbStandardBikes>8</nbStandardBikes>
    <nbEBikes>2</nbEBikes>
    <nbEmptyDocks>9</nbEmptyDocks>
    <nbDocks>19</nbDocks>
  </station>
  <station>
    <id>3</id>
    <name>Christopher Street, Liverpool Street &amp; Broadgate</name>
    <terminalName>001012</terminalName>
    <lat>51.52128377</lat>
    <long>-0.084605692</long>
    <installed>true</installed>
    <locked>false</locked>
    <installDate>1278585780000</installDate>
    <removalDate/>
    <temporary>false</temporary>
    <nbBikes>0</nbBikes>
    <nbStandardBikes>0</nbStandardBikes>
    <nbEBikes>0</nbEBikes>
    <nbEmptyDocks>32</nbEmptyDocks>
    <nbDocks>32</nbDocks>
  </station>
</stations>"#;

    #[test]
    fn parses_stations_in_order() {
        let stations = parse_feed(SAMPLE).unwrap();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, 1);
        assert_eq!(stations[0].name, "River Street , Clerkenwell");
        assert!((stations[0].latitude - 51.529_163_47).abs() < 1e-9);
        assert_eq!(stations[0].bike_count, 10);
        assert_eq!(stations[0].standard_bike_count, 8);
        assert_eq!(stations[0].e_bike_count, 2);
        assert_eq!(stations[0].empty_dock_count, 9);
        assert_eq!(stations[0].dock_count, 19);
        assert_eq!(stations[1].id, 3);
        assert_eq!(stations[1].dock_count, 32);
    }

    #[test]
    fn unescapes_entities_in_names() {
        let stations = parse_feed(SAMPLE).unwrap();
        assert_eq!(
            stations[1].name,
            "Christopher Street, Liverpool Street & Broadgate"
        );
    }

    #[test]
    fn empty_document_has_no_stations() {
        let stations = parse_feed(r#"<stations lastUpdate="0" version="2.0"></stations>"#).unwrap();
        assert!(stations.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            parse_feed("<stations><station><id>1</id>"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn client_uses_custom_endpoint() {
        let client = FeedClient::with_endpoint("http://localhost:9999/feed.xml").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/feed.xml");
    }
}
