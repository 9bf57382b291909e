#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI plumbing for the city cycling binaries.
//!
//! Both the collector and the server pick a storage backend at startup and
//! then only ever hold an `Arc<dyn SnapshotStore>`. [`StorageArgs`] is the
//! common set of flags and [`open_store`] turns them into a store, verifying
//! bucket access up front in R2 mode.

use std::path::PathBuf;
use std::sync::Arc;

use city_cycling_r2::{R2Config, R2ConfigError, R2SnapshotStore};
use city_cycling_storage::local::LocalSnapshotStore;
use city_cycling_storage::{SnapshotStore, StorageError};

/// Where snapshots live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// `.tsv` files in a local directory.
    Local,
    /// Objects in a Cloudflare R2 / S3-compatible bucket.
    R2,
}

/// Storage selection flags shared by every binary.
#[derive(Debug, Clone, clap::Args)]
pub struct StorageArgs {
    /// Storage backend to read and write snapshots
    #[arg(long, value_enum, default_value_t = StorageBackend::Local)]
    pub backend: StorageBackend,
    /// Directory containing snapshot files (local backend only)
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
}

/// Errors that can occur while opening a store.
#[derive(Debug, thiserror::Error)]
pub enum OpenStoreError {
    /// R2 settings are incomplete.
    #[error(transparent)]
    Config(#[from] R2ConfigError),

    /// The configured bucket is unreachable.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Opens the store selected by `args`.
///
/// In R2 mode the configuration is read from the environment and the
/// bucket is checked before returning.
///
/// # Errors
///
/// Returns [`OpenStoreError`] if R2 configuration is missing or the bucket
/// cannot be reached.
pub async fn open_store(args: &StorageArgs) -> Result<Arc<dyn SnapshotStore>, OpenStoreError> {
    match args.backend {
        StorageBackend::Local => {
            log::info!("Using local file storage in {}", args.data_dir.display());
            Ok(Arc::new(LocalSnapshotStore::new(&args.data_dir)))
        }
        StorageBackend::R2 => {
            let config = R2Config::from_env()?;
            log::info!("Using R2 storage:");
            log::info!("  Endpoint: {}", config.endpoint);
            log::info!("  Bucket: {}", config.bucket);
            log::info!("  Region: {}", config.region);
            log::info!("  Prefix: {}", config.prefix);

            let store = R2SnapshotStore::new(&config);
            store.verify_bucket().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Loads `.env` (if present) and initializes `pretty_env_logger` from
/// `RUST_LOG`.
pub fn init_logger() {
    match dotenv::dotenv() {
        Err(e) if !e.not_found() => eprintln!("Ignoring unreadable .env file: {e}"),
        _ => {}
    }
    pretty_env_logger::init_custom_env("RUST_LOG");
}
