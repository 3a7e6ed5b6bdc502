//! R2 client implementation.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Default lifetime of a presigned PUT (15 minutes).
pub const DEFAULT_PUT_EXPIRY_SECS: u64 = 900;

/// Default lifetime of a presigned GET (15 minutes).
pub const DEFAULT_GET_EXPIRY_SECS: u64 = 900;

/// Maximum allowed expiry (7 days), the S3 presigning limit.
pub const MAX_EXPIRY_SECS: u64 = 604800;

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Lifetime of upload credentials
    pub put_expiry: Duration,
    /// Lifetime of read credentials
    pub get_expiry: Duration,
}

impl R2Config {
    /// Create config from environment variables.
    ///
    /// `R2_ENDPOINT_URL` wins over the endpoint derived from
    /// `CLOUDFLARE_ACCOUNT_ID`.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint_url = match std::env::var("R2_ENDPOINT_URL") {
            Ok(url) => url,
            Err(_) => {
                let account_id = std::env::var("CLOUDFLARE_ACCOUNT_ID").map_err(|_| {
                    StorageError::config_error("R2_ENDPOINT_URL or CLOUDFLARE_ACCOUNT_ID not set")
                })?;
                format!("https://{}.r2.cloudflarestorage.com", account_id)
            }
        };

        Ok(Self {
            endpoint_url,
            access_key_id: std::env::var("R2_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET")
                .map_err(|_| StorageError::config_error("R2_BUCKET not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            put_expiry: expiry_from_env("PRESIGN_PUT_EXPIRY_SECS", DEFAULT_PUT_EXPIRY_SECS),
            get_expiry: expiry_from_env("PRESIGN_GET_EXPIRY_SECS", DEFAULT_GET_EXPIRY_SECS),
        })
    }
}

fn expiry_from_env(var: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(var)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_secs)
            .min(MAX_EXPIRY_SECS),
    )
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    put_expiry: Duration,
    get_expiry: Duration,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            put_expiry: config.put_expiry,
            get_expiry: config.get_expiry,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Generate a presigned URL for a single direct PUT.
    pub async fn presign_put(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let presign_config = PresigningConfig::expires_in(self.put_expiry)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        debug!("Presigned PUT for {}", key);
        Ok(presigned.uri().to_string())
    }

    /// Generate a presigned URL for GET.
    pub async fn presign_get(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let presign_config = PresigningConfig::expires_in(self.get_expiry)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        debug!("Presigned GET for {}", key);
        Ok(presigned.uri().to_string())
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Keys are relative to the bucket root and never empty.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() || key.starts_with('/') || key.contains("..") {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}
