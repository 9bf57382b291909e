//! Tab-separated snapshot format.
//!
//! One header line naming [`COLUMNS`], then one line per station. Every row
//! repeats the snapshot's capture instant in the `timestamp` column. Tabs and
//! line breaks in station names become spaces; nothing is quoted.
//!
//! Decoding is deliberately lenient: rows with fewer than [`COLUMNS`] fields
//! are skipped and unparseable numeric cells become zero, so one bad row
//! never loses a whole snapshot. Only a body without a header is an error.

use chrono::{DateTime, SecondsFormat, Utc};
use city_cycling_station_models::{Snapshot, Station};

/// Column names, in file order.
pub const COLUMNS: [&str; 10] = [
    "timestamp",
    "id",
    "name",
    "lat",
    "long",
    "nb_bikes",
    "nb_standard_bikes",
    "nb_ebikes",
    "nb_empty_docks",
    "nb_docks",
];

/// Capture time reported when the first data row's timestamp is unreadable.
pub const UNKNOWN_CAPTURE_TIME: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Errors that can occur while encoding or decoding a snapshot body.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The body is missing or contains no header line.
    #[error("Snapshot body is empty")]
    EmptyInput,

    /// The header line could not be read.
    #[error("Malformed snapshot body: {0}")]
    Malformed(#[from] csv::Error),

    /// Flushing the encoded output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes `stations` captured at `captured_at` into the tabular format.
///
/// # Errors
///
/// Returns [`CodecError`] if the in-memory writer fails.
pub fn encode(stations: &[Station], captured_at: DateTime<Utc>) -> Result<Vec<u8>, CodecError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(COLUMNS)?;

    let timestamp = format_timestamp(captured_at);
    for station in stations {
        writer.write_record([
            timestamp.clone(),
            station.id.to_string(),
            station.name.replace(['\t', '\n', '\r'], " "),
            format!("{:.6}", station.latitude),
            format!("{:.6}", station.longitude),
            station.bike_count.to_string(),
            station.standard_bike_count.to_string(),
            station.e_bike_count.to_string(),
            station.empty_dock_count.to_string(),
            station.dock_count.to_string(),
        ])?;
    }

    writer.into_inner().map_err(|e| CodecError::Io(e.into_error()))
}

/// Decodes a snapshot body.
///
/// The capture instant is taken from the first complete row. If that cell
/// doesn't parse, or there are no rows at all, [`UNKNOWN_CAPTURE_TIME`] is
/// returned in its place. A snapshot of zero stations therefore can't get
/// its timestamp back from the body alone; [`crate::decode_snapshot`]
/// recovers it from the key.
///
/// Rows end at `\n` only. A trailing `\r` is dropped from the last cell so
/// CRLF bodies still decode, while a bare `\r` inside a cell is kept.
///
/// # Errors
///
/// Returns [`CodecError::EmptyInput`] for an empty body and
/// [`CodecError::Malformed`] if the header line is unreadable.
pub fn decode(body: &[u8]) -> Result<Snapshot, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::EmptyInput);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(body);

    if reader.headers()?.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    let mut captured_at: Option<DateTime<Utc>> = None;
    let mut stations = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping unreadable row {}: {e}", row + 1);
                continue;
            }
        };

        if record.len() < COLUMNS.len() {
            continue;
        }

        if captured_at.is_none() {
            captured_at = Some(parse_timestamp(&record[0]).unwrap_or(UNKNOWN_CAPTURE_TIME));
        }

        stations.push(Station {
            id: parse_or_zero(&record[1]),
            name: record[2].to_string(),
            latitude: parse_or_zero(&record[3]),
            longitude: parse_or_zero(&record[4]),
            bike_count: parse_or_zero(&record[5]),
            standard_bike_count: parse_or_zero(&record[6]),
            e_bike_count: parse_or_zero(&record[7]),
            empty_dock_count: parse_or_zero(&record[8]),
            dock_count: parse_or_zero(record[9].trim_end_matches('\r')),
        });
    }

    Ok(Snapshot::new(
        captured_at.unwrap_or(UNKNOWN_CAPTURE_TIME),
        stations,
    ))
}

/// Formats an instant the way the `timestamp` column stores it
/// (RFC 3339, whole seconds, `Z` suffix).
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn parse_or_zero<T: std::str::FromStr + Default>(s: &str) -> T {
    s.parse().unwrap_or_default()
}
