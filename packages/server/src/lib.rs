#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the city cycling application.
//!
//! Serves the map page and a small JSON API over the stored snapshots:
//! the latest station list, the list of capture times, an aggregate
//! history series, and the snapshot nearest to a requested instant. The
//! history series and per-timestamp lookups are cached in memory (see
//! [`cache`]).

pub mod cache;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use city_cycling_feed::FeedClient;
use city_cycling_storage::{Deadline, SnapshotStore};

use crate::cache::{HistoryCache, SnapshotCache};

/// Shared application state.
pub struct AppState {
    /// Authoritative snapshot set.
    pub store: Arc<dyn SnapshotStore>,
    /// Live feed used when storage has no latest snapshot.
    pub feed: Option<FeedClient>,
    /// Aggregate series cache, valid for its TTL.
    pub history: HistoryCache,
    /// Station lists by requested timestamp, never invalidated.
    pub snapshots: SnapshotCache,
    /// Upper bound on the storage work done for one request.
    pub request_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        feed: Option<FeedClient>,
        history_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            history: HistoryCache::new(history_ttl),
            snapshots: SnapshotCache::new(),
            request_timeout,
        }
    }

    /// Deadline for the storage calls of a request starting now.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Registers every route on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::map_page)).service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/stations", web::get().to(handlers::stations))
            .route("/timestamps", web::get().to(handlers::timestamps))
            .route("/history", web::get().to(handlers::history))
            .route(
                "/history/snapshot",
                web::get().to(handlers::history_snapshot),
            ),
    );
}

/// Starts the city cycling API server.
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(state: AppState, config: &ServerConfig) -> std::io::Result<()> {
    log::info!(
        "Serving snapshots from {} (history ttl {:?}, request timeout {:?})",
        state.store.describe(),
        state.history.ttl(),
        state.request_timeout
    );

    let state = web::Data::new(state);
    let bind_addr = config.bind_addr.clone();
    let port = config.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
