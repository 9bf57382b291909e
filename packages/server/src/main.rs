#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the city cycling API server.

use std::time::Duration;

use clap::Parser;
use city_cycling_cli_utils::{StorageArgs, StorageBackend, init_logger, open_store};
use city_cycling_feed::FeedClient;
use city_cycling_server::{AppState, ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "city_cycling_server", about = "Bike-share snapshot API server")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,
    /// HTTP port (falls back to `PORT`, then 8080)
    #[arg(long)]
    port: Option<u16>,
    /// Address to bind (falls back to `BIND_ADDR`, then 127.0.0.1)
    #[arg(long)]
    bind_addr: Option<String>,
    /// Seconds the aggregate history stays cached
    #[arg(long, default_value = "600")]
    history_ttl_secs: u64,
    /// Seconds of storage work allowed per request
    #[arg(long, default_value = "60")]
    request_timeout_secs: u64,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let mut cli = Cli::parse();

    if std::env::var_os("USE_R2").is_some_and(|v| !v.is_empty()) {
        cli.storage.backend = StorageBackend::R2;
    }

    let config = ServerConfig {
        bind_addr: cli
            .bind_addr
            .or_else(|| std::env::var("BIND_ADDR").ok())
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        port: cli
            .port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(8080),
    };

    let store = open_store(&cli.storage).await?;

    let feed = match FeedClient::new() {
        Ok(client) => Some(client),
        Err(e) => {
            log::warn!("Live feed fallback disabled: {e}");
            None
        }
    };

    let state = AppState::new(
        store,
        feed,
        Duration::from_secs(cli.history_ttl_secs),
        Duration::from_secs(cli.request_timeout_secs),
    );

    run_server(state, &config).await?;

    Ok(())
}
