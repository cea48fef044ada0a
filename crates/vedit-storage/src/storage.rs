//! The storage collaborator used by the pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{R2Client, R2Config};
use crate::error::{StorageError, StorageResult};
use crate::locator::SourceLocator;

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Public base URL (CDN) prepended to object keys; presigned URLs otherwise
    pub public_base_url: Option<String>,
    /// Directory that receives uploads when no bucket is configured
    pub local_dir: Option<PathBuf>,
    /// Largest artifact accepted for upload
    pub max_upload_bytes: u64,
    pub presign_expiry: Duration,
    pub download_timeout: Duration,
    /// Directory that `file://` and bare-path sources must resolve into;
    /// local sources are refused when unset
    pub local_source_root: Option<PathBuf>,
    /// Buckets object sources may name; empty means the R2 upload bucket only
    pub allowed_buckets: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: None,
            local_dir: None,
            max_upload_bytes: 500 * 1024 * 1024,
            presign_expiry: Duration::from_secs(7 * 24 * 3600),
            download_timeout: Duration::from_secs(300),
            local_source_root: None,
            allowed_buckets: Vec::new(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            public_base_url: std::env::var("STORAGE_PUBLIC_URL").ok().filter(|s| !s.is_empty()),
            local_dir: std::env::var("STORAGE_LOCAL_DIR").ok().map(PathBuf::from),
            max_upload_bytes: std::env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
            presign_expiry: std::env::var("STORAGE_PRESIGN_EXPIRY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.presign_expiry),
            download_timeout: std::env::var("STORAGE_DOWNLOAD_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            local_source_root: std::env::var("STORAGE_LOCAL_SOURCE_ROOT")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            allowed_buckets: std::env::var("STORAGE_ALLOWED_BUCKETS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|b| !b.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Fetches source media and publishes rendered artifacts.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Fetch `locator` into `dest`, returning the number of bytes written.
    async fn download(&self, locator: &str, dest: &Path) -> StorageResult<u64>;

    /// Upload a local artifact under `key`, returning its public locator.
    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;
}

/// MIME type for the artifacts the pipeline produces.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("srt") => "application/x-subrip",
        _ => "application/octet-stream",
    }
}

/// Storage client dispatching on the locator scheme.
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    r2: Option<R2Client>,
    config: StorageConfig,
}

impl StorageClient {
    pub fn new(config: StorageConfig, r2: Option<R2Client>) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| StorageError::config_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, r2, config })
    }

    /// Create from environment variables. R2 is used when any `R2_*`
    /// variable is set.
    pub fn from_env() -> StorageResult<Self> {
        let r2 = if R2Config::is_configured() {
            Some(R2Client::from_env()?)
        } else {
            None
        };
        Self::new(StorageConfig::from_env(), r2)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn r2(&self) -> Option<&R2Client> {
        self.r2.as_ref()
    }

    async fn download_http(&self, url: &Url, dest: &Path) -> StorageResult<u64> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::download_failed(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::download_failed(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Copy a local source, which must resolve inside the local source root
    /// after symlinks and `..` are followed.
    async fn copy_local(&self, source: &Path, dest: &Path) -> StorageResult<u64> {
        let Some(root) = &self.config.local_source_root else {
            return Err(StorageError::UnsupportedScheme(
                "file (local sources are disabled, set STORAGE_LOCAL_SOURCE_ROOT)".to_string(),
            ));
        };
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| StorageError::config_error(format!("local source root {}: {}", root.display(), e)))?;
        let resolved = match tokio::fs::canonicalize(source).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(source.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !resolved.starts_with(&root) {
            return Err(StorageError::UnsupportedScheme(format!(
                "file ({} is outside the local source root)",
                source.display()
            )));
        }
        Ok(tokio::fs::copy(&resolved, dest).await?)
    }

    /// Whether object sources may be read from `bucket`.
    fn bucket_allowed(&self, r2: &R2Client, bucket: &str) -> bool {
        if self.config.allowed_buckets.is_empty() {
            bucket == r2.bucket()
        } else {
            self.config.allowed_buckets.iter().any(|b| b == bucket)
        }
    }

    async fn public_url(&self, key: &str) -> StorageResult<String> {
        if let Some(base) = &self.config.public_base_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/')));
        }
        match &self.r2 {
            Some(r2) => r2.presign_get(key, self.config.presign_expiry).await,
            None => Err(StorageError::config_error(
                "STORAGE_PUBLIC_URL must be set when R2 is not configured",
            )),
        }
    }
}

#[async_trait]
impl MediaStorage for StorageClient {
    async fn download(&self, locator: &str, dest: &Path) -> StorageResult<u64> {
        let source = SourceLocator::parse(locator)?;
        debug!(scheme = source.scheme(), "Fetching {} to {}", locator, dest.display());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = match &source {
            SourceLocator::Http(url) => self.download_http(url, dest).await,
            SourceLocator::Object { bucket, key } => match &self.r2 {
                Some(r2) if !self.bucket_allowed(r2, bucket) => Err(StorageError::UnsupportedScheme(format!(
                    "{} (bucket {} is not allowed)",
                    locator.split("://").next().unwrap_or("object"),
                    bucket
                ))),
                Some(r2) => r2.download_file(Some(bucket), key, dest).await,
                None => Err(StorageError::config_error(format!(
                    "R2 is not configured, cannot fetch {}",
                    locator
                ))),
            },
            SourceLocator::Local(path) => self.copy_local(path, dest).await,
        };

        match result {
            Ok(0) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(StorageError::download_failed(format!("{} is empty", locator)))
            }
            Ok(bytes) => {
                info!("Fetched {} ({} bytes)", locator, bytes);
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(dest).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", dest.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?
            .len();

        if size == 0 {
            return Err(StorageError::upload_failed(format!("{} is empty", path.display())));
        }
        if size > self.config.max_upload_bytes {
            return Err(StorageError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.config.max_upload_bytes,
            });
        }

        if let Some(r2) = &self.r2 {
            r2.upload_file(path, key, content_type).await?;
            return self.public_url(key).await;
        }

        let Some(root) = &self.config.local_dir else {
            return Err(StorageError::config_error(
                "No upload target configured (set R2_* or STORAGE_LOCAL_DIR)",
            ));
        };

        let target = root.join(key.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", target.display(), e)))?;
        info!("Stored {} at {}", path.display(), target.display());

        if self.config.public_base_url.is_some() {
            return self.public_url(key).await;
        }
        Url::from_file_path(&target)
            .map(|u| u.to_string())
            .map_err(|_| StorageError::upload_failed(format!("{} is not absolute", target.display())))
    }
}
