#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cloudflare R2 (S3-compatible) snapshot storage backend.
//!
//! Each snapshot is one object under a configurable key prefix
//! (default `snapshots/`). Prefixes are implicit in S3, so there is no
//! container to create before writing. Listing is paginated to exhaustion
//! and the result is sorted here; the order returned by the service is not
//! relied on.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `S3_ACCESS_KEY_ID` | Yes | S3-compatible access key |
//! | `S3_SECRET_ACCESS_KEY` | Yes | S3-compatible secret key |
//! | `S3_ENDPOINT` | Yes | Endpoint URL (e.g. `https://<account>.r2.cloudflarestorage.com`) |
//! | `S3_BUCKET_NAME` | Yes | Bucket holding the snapshots |
//! | `S3_PREFIX` | No | Key prefix, default `snapshots/` |
//! | `S3_REGION` | No | Region, default `auto` (R2 ignores it but the SDK requires one) |

use std::time::Instant;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::get_object::GetObjectError;
use chrono::{DateTime, SubsecRound as _, Utc};
use city_cycling_station_models::{Snapshot, Station};
use city_cycling_storage::naming::{DEFAULT_OBJECT_PREFIX, sort_newest_first};
use city_cycling_storage::{SnapshotNaming, SnapshotStore, StorageError, codec, decode_snapshot};

/// Content type recorded on uploaded snapshots.
const CONTENT_TYPE: &str = "text/tab-separated-values";

const DEFAULT_REGION: &str = "auto";

/// Errors that can occur while configuring the R2 backend.
#[derive(Debug, thiserror::Error)]
pub enum R2ConfigError {
    /// One or more required environment variables are unset or empty.
    #[error("Missing required environment variables: {}", .names.join(", "))]
    MissingEnv {
        /// Names of every missing variable.
        names: Vec<String>,
    },
}

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct R2Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub bucket: String,
    pub prefix: String,
    pub region: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl R2Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`R2ConfigError::MissingEnv`] listing every required
    /// variable that is unset.
    pub fn from_env() -> Result<Self, R2ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`R2ConfigError::MissingEnv`] listing every required
    /// variable that `lookup` doesn't provide.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, R2ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut require = |name: &str| {
            get(name).unwrap_or_else(|| {
                missing.push(name.to_string());
                String::new()
            })
        };

        let access_key_id = require("S3_ACCESS_KEY_ID");
        let secret_access_key = require("S3_SECRET_ACCESS_KEY");
        let endpoint = require("S3_ENDPOINT");
        let bucket = require("S3_BUCKET_NAME");

        if !missing.is_empty() {
            return Err(R2ConfigError::MissingEnv { names: missing });
        }

        Ok(Self {
            access_key_id,
            secret_access_key,
            endpoint,
            bucket,
            prefix: get("S3_PREFIX").unwrap_or_else(|| DEFAULT_OBJECT_PREFIX.to_string()),
            region: get("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        })
    }
}

/// Snapshot store backed by an S3-compatible bucket.
pub struct R2SnapshotStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    naming: SnapshotNaming,
}

impl R2SnapshotStore {
    /// Creates a store from `config`. No network calls are made; see
    /// [`Self::verify_bucket`].
    #[must_use]
    pub fn new(config: &R2Config) -> Self {
        let creds = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "city-cycling-env",
        );

        let sdk_config = aws_sdk_s3::Config::builder()
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            naming: SnapshotNaming::new(config.prefix.clone()),
        }
    }

    /// Checks that the bucket exists and the credentials can reach it.
    ///
    /// Meant as a startup precondition so a misconfigured bucket fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SubstrateUnavailable`] if `HeadBucket` fails.
    pub async fn verify_bucket(&self) -> Result<(), StorageError> {
        log::info!("Verifying access to bucket '{}'", self.bucket);

        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::substrate(
                    "verify_bucket",
                    format!("failed to access bucket '{}': {e}", self.bucket),
                )
            })?;

        log::info!("  bucket verified");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for R2SnapshotStore {
    fn naming(&self) -> &SnapshotNaming {
        &self.naming
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.naming.prefix())
    }

    async fn write_snapshot(
        &self,
        stations: &[Station],
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let start = Instant::now();
        let captured_at = now.trunc_subsecs(0);
        let key = self.naming.name_for(captured_at);
        let body = codec::encode(stations, captured_at)
            .map_err(|e| StorageError::substrate("encode", e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .content_type(CONTENT_TYPE)
            .metadata("timestamp", codec::format_timestamp(captured_at))
            .metadata("stations", stations.len().to_string())
            .send()
            .await
            .map_err(|e| StorageError::substrate("write_snapshot", e))?;

        log::info!(
            "write_snapshot completed in {:?} (s3://{}/{key}, stations={})",
            start.elapsed(),
            self.bucket,
            stations.len()
        );
        Ok(key)
    }

    async fn read_by_key(&self, key: &str) -> Result<Snapshot, StorageError> {
        let start = Instant::now();

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Err(StorageError::NotFound {
                        key: key.to_string(),
                    });
                }
                return Err(StorageError::substrate("read_by_key", err));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::substrate("read_by_key", e))?
            .into_bytes();

        let snapshot = decode_snapshot(&self.naming, key, &bytes)?;

        log::debug!(
            "read_by_key completed in {:?} (key={key}, stations={})",
            start.elapsed(),
            snapshot.stations.len()
        );
        Ok(snapshot)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();
        let prefix = self.naming.prefix();

        let mut raw = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| StorageError::substrate("list_keys", e))?;

            raw.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        let keys = snapshot_keys(&self.naming, raw);
        log::info!(
            "list_keys completed in {:?} (found {} snapshots)",
            start.elapsed(),
            keys.len()
        );
        Ok(keys)
    }
}

/// Keeps only keys following the snapshot naming scheme, newest first.
fn snapshot_keys(naming: &SnapshotNaming, raw: Vec<String>) -> Vec<String> {
    let mut keys: Vec<String> = raw
        .into_iter()
        .filter(|key| {
            let ok = naming.is_snapshot_key(key);
            if !ok {
                log::debug!("Ignoring non-snapshot object {key}");
            }
            ok
        })
        .collect();
    sort_newest_first(&mut keys);
    keys
}
