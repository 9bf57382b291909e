#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the snapshot collector.

use std::time::Duration;

use clap::Parser;
use city_cycling_cli_utils::{StorageArgs, init_logger, open_store};
use city_cycling_collector::{Interruptible, collect_once, until_shutdown};
use city_cycling_feed::{DEFAULT_ENDPOINT, FeedClient};
use city_cycling_storage::Deadline;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Parser)]
#[command(
    name = "city_cycling_collector",
    about = "Polls the bike-share feed and stores snapshots"
)]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,
    /// Seconds between fetches (0 runs once and exits)
    #[arg(long, default_value = "300")]
    interval_secs: u64,
    /// Fetch once and exit
    #[arg(long)]
    once: bool,
    /// Seconds allowed for the storage work of one fetch
    #[arg(long, default_value = "120")]
    tick_timeout_secs: u64,
    /// Feed URL to poll
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    feed_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let cli = Cli::parse();
    let store = open_store(&cli.storage).await?;
    let feed = FeedClient::with_endpoint(&cli.feed_url)?;
    let tick_timeout = Duration::from_secs(cli.tick_timeout_secs);

    let key = collect_once(&feed, store.as_ref(), &Deadline::after(tick_timeout)).await?;
    log::info!("Initial snapshot written: {key}");

    if cli.once || cli.interval_secs == 0 {
        log::info!("One-shot mode: exiting after single fetch");
        return Ok(());
    }

    let period = Duration::from_secs(cli.interval_secs);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    log::info!("Collector running with {period:?} interval. Press Ctrl+C to stop.");

    let signal = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let deadline = Deadline::after(tick_timeout);
                let tick = collect_once(&feed, store.as_ref(), &deadline);
                match until_shutdown(tick, shutdown.as_mut()).await {
                    Interruptible::Completed(Ok(_)) => {}
                    Interruptible::Completed(Err(e)) => log::error!("Collection failed: {e}"),
                    Interruptible::Interrupted(signal) => {
                        log::warn!("Abandoning in-flight collection");
                        break signal;
                    }
                }
            }
            signal = &mut shutdown => break signal,
        }
    };

    match signal {
        Ok(name) => log::info!("Received {name}, shutting down"),
        Err(e) => log::error!("Signal handler failed, shutting down: {e}"),
    }

    Ok(())
}

/// Resolves on the first Ctrl-C or SIGTERM, naming the signal.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
    }
}
