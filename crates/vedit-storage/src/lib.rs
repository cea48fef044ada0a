//! Storage collaborator for the edit pipeline.
//!
//! This crate provides:
//! - Source fetch from http(s), R2/S3 object keys and local files
//! - Artifact upload to Cloudflare R2 (or a local directory)
//! - Public URL resolution (CDN base URL or presigned GET)

pub mod client;
pub mod error;
pub mod locator;
pub mod storage;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use locator::SourceLocator;
pub use storage::{content_type_for, MediaStorage, StorageClient, StorageConfig};
