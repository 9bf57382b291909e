//! HTTP handler functions for the city cycling API.

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use city_cycling_server_models::{
    ApiError, ApiHealth, ApiHistory, ApiHistoryPoint, ApiStations, ApiTimestamps,
    SnapshotQueryParams, api_timestamp,
};
use city_cycling_storage::history::compute_series;
use city_cycling_storage::nearest::find_nearest;
use city_cycling_storage::{Deadline, StorageError};
use include_dir::{Dir, include_dir};

use crate::AppState;

static TEMPLATES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

const HISTORY_CACHE_CONTROL: &str = "public, max-age=3600";
const SNAPSHOT_CACHE_CONTROL: &str = "public, max-age=604800, immutable";

fn error_body(message: &str) -> ApiError {
    ApiError {
        error: message.to_string(),
    }
}

/// Maps a storage error to a response: "no such data" is 404, a lapsed
/// deadline is 504, anything else is a backend failure.
fn storage_error_response(context: &str, e: &StorageError) -> HttpResponse {
    if e.is_not_found() {
        log::warn!("{context}: {e}");
        return HttpResponse::NotFound().json(error_body(&e.to_string()));
    }

    log::error!("{context}: {e}");
    match e {
        StorageError::DeadlineExceeded { .. } => {
            HttpResponse::GatewayTimeout().json(error_body(context))
        }
        _ => HttpResponse::InternalServerError().json(error_body(context)),
    }
}

/// `GET /`
pub async fn map_page() -> HttpResponse {
    match TEMPLATES
        .get_file("map.html")
        .and_then(include_dir::File::contents_utf8)
    {
        Some(html) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html),
        None => {
            log::error!("map.html template is missing from the build");
            HttpResponse::InternalServerError().body("Internal server error")
        }
    }
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/stations`
///
/// Returns the latest stored snapshot, falling back to a live feed fetch
/// when storage has nothing to offer.
pub async fn stations(state: web::Data<AppState>) -> HttpResponse {
    let deadline = state.deadline();

    let error = match deadline
        .run("read_latest", state.store.read_latest())
        .await
    {
        Ok(snapshot) => {
            return HttpResponse::Ok().json(ApiStations::new(
                snapshot.captured_at,
                &snapshot.stations,
            ));
        }
        Err(e) => e,
    };

    let Some(feed) = &state.feed else {
        return storage_error_response("Failed to read latest snapshot", &error);
    };

    log::info!("No stored data ({error}), fetching live");
    match feed.fetch_current_stations().await {
        Ok(live) => HttpResponse::Ok().json(ApiStations::new(live.captured_at, &live.stations)),
        Err(e) => {
            log::error!("Live fetch failed: {e}");
            HttpResponse::InternalServerError().json(error_body("Failed to fetch station data"))
        }
    }
}

/// `GET /api/timestamps`
pub async fn timestamps(state: web::Data<AppState>) -> HttpResponse {
    let deadline = state.deadline();

    match deadline
        .run("list_timestamps", state.store.list_timestamps())
        .await
    {
        Ok(timestamps) => HttpResponse::Ok().json(ApiTimestamps {
            timestamps: timestamps.into_iter().map(api_timestamp).collect(),
        }),
        Err(e) => storage_error_response("Failed to list timestamps", &e),
    }
}

/// `GET /api/history`
///
/// Aggregate totals per snapshot, newest first. Served from the history
/// cache while it is fresh.
pub async fn history(state: web::Data<AppState>) -> HttpResponse {
    let deadline = state.deadline();
    let store = state.store.as_ref();

    match state
        .history
        .get_or_compute(|| compute_series(store, &deadline))
        .await
    {
        Ok(points) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, HISTORY_CACHE_CONTROL))
            .json(ApiHistory {
                data_points: points.iter().map(ApiHistoryPoint::from).collect(),
            }),
        Err(e) => storage_error_response("Failed to fetch historical data", &e),
    }
}

/// `GET /api/history/snapshot?timestamp=...`
///
/// Stations from the snapshot closest to `timestamp`. The response echoes
/// the requested instant.
pub async fn history_snapshot(
    state: web::Data<AppState>,
    params: web::Query<SnapshotQueryParams>,
) -> HttpResponse {
    let Some(raw) = params.timestamp.as_deref().filter(|s| !s.is_empty()) else {
        return HttpResponse::BadRequest().json(error_body("Missing timestamp parameter"));
    };

    let Ok(target) = DateTime::parse_from_rfc3339(raw) else {
        return HttpResponse::BadRequest().json(error_body("Invalid timestamp format"));
    };
    let target = target.with_timezone(&Utc);
    let cache_key = api_timestamp(target);

    let deadline: Deadline = state.deadline();
    let store = state.store.as_ref();

    match state
        .snapshots
        .get_or_fetch(&cache_key, || async {
            find_nearest(store, target, &deadline)
                .await
                .map(|snapshot| snapshot.stations)
        })
        .await
    {
        Ok(stations) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, SNAPSHOT_CACHE_CONTROL))
            .json(ApiStations::new(target, &stations)),
        Err(e) => storage_error_response("Failed to fetch snapshot data", &e),
    }
}
