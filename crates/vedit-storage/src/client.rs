//! Cloudflare R2 object store access over the S3 API.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

const ENDPOINT_VAR: &str = "R2_ENDPOINT_URL";
const BUCKET_VAR: &str = "R2_BUCKET_NAME";

/// Connection settings for R2.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// S3 API endpoint of the account
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Upload bucket; also the bucket of object locators that name none
    pub bucket_name: String,
    /// "auto" for R2
    pub region: String,
}

fn required_var(name: &str) -> StorageResult<String> {
    std::env::var(name).map_err(|_| StorageError::config_error(format!("{} not set", name)))
}

impl R2Config {
    /// Read `R2_ENDPOINT_URL`, `R2_ACCESS_KEY_ID`, `R2_SECRET_ACCESS_KEY`,
    /// `R2_BUCKET_NAME` and the optional `R2_REGION`.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required_var(ENDPOINT_VAR)?,
            access_key_id: required_var("R2_ACCESS_KEY_ID")?,
            secret_access_key: required_var("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required_var(BUCKET_VAR)?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }

    /// Whether the deployment intends to use R2 at all. A partial
    /// configuration still counts, so that `from_env` reports what is missing.
    pub fn is_configured() -> bool {
        [ENDPOINT_VAR, BUCKET_VAR]
            .iter()
            .any(|name| std::env::var(name).is_ok())
    }
}

/// Object store client bound to one default bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "vedit-r2",
        );

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket_name,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        R2Config::from_env().map(Self::new)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Put a local file under `key` in the default bucket.
    pub async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}/{}: {}", self.bucket, key, e)))?;

        debug!(bucket = %self.bucket, key, "Object uploaded");
        Ok(())
    }

    /// Write an object to `dest` chunk by chunk and return its size.
    /// `bucket` defaults to the client's bucket.
    pub async fn download_file(&self, bucket: Option<&str>, key: &str, dest: &Path) -> StorageResult<u64> {
        let bucket = bucket.unwrap_or(&self.bucket);

        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::not_found(format!("{}/{}", bucket, key)),
                _ => StorageError::download_failed(format!("{}/{}: {}", bucket, key, e)),
            })?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = object.body;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::download_failed(format!("{}/{}: {}", bucket, key, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(bucket, key, bytes = written, "Object downloaded");
        Ok(written)
    }

    /// Time-limited GET URL for an object in the default bucket.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    /// HEAD the default bucket.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::config_error(format!("bucket {} unreachable: {}", self.bucket, e)))
    }
}
