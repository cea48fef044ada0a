//! Source media locators.

use std::path::PathBuf;

use url::Url;

use crate::error::{StorageError, StorageResult};

/// Where a job's source media lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Plain HTTP(S) download
    Http(Url),
    /// Object in an S3-compatible bucket (`r2://bucket/key`, `s3://bucket/key`)
    Object { bucket: String, key: String },
    /// File on the worker's filesystem (`file://` URL or bare path)
    Local(PathBuf),
}

impl SourceLocator {
    /// Parse a locator string.
    pub fn parse(locator: &str) -> StorageResult<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(StorageError::InvalidLocator("empty locator".to_string()));
        }

        for scheme in ["r2://", "s3://"] {
            if let Some(rest) = locator.strip_prefix(scheme) {
                return match rest.split_once('/') {
                    Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self::Object {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }),
                    _ => Err(StorageError::InvalidLocator(format!(
                        "expected {}<bucket>/<key>, got {}",
                        scheme, locator
                    ))),
                };
            }
        }

        match Url::parse(locator) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self::Http(url)),
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|_| StorageError::InvalidLocator(locator.to_string())),
                other => Err(StorageError::UnsupportedScheme(other.to_string())),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self::Local(PathBuf::from(locator))),
            Err(e) => Err(StorageError::InvalidLocator(format!("{}: {}", locator, e))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            SourceLocator::Http(_) => "http",
            SourceLocator::Object { .. } => "object",
            SourceLocator::Local(_) => "file",
        }
    }
}
