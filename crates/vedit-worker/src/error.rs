//! Worker error types.

use std::error::Error as StdError;

use thiserror::Error;

use vedit_media::MediaError;
use vedit_models::ModelError;
use vedit_planner::PlannerError;
use vedit_queue::QueueError;
use vedit_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Fatal job errors. Thumbnail, caption, music and webhook failures are
/// absorbed where they happen and never become a `WorkerError`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download failed: {0}")]
    Download(#[source] StorageError),

    #[error("Analysis failed: {0}")]
    Analysis(#[source] PlannerError),

    #[error("Planning failed: {0}")]
    Planning(#[source] PlannerError),

    #[error("Render failed: {0}")]
    Render(#[source] MediaError),

    #[error("Upload of {platform} failed: {source}")]
    Upload {
        platform: String,
        #[source]
        source: StorageError,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job exceeded maximum duration of {0} seconds")]
    Timeout(u64),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upload(platform: impl Into<String>, source: StorageError) -> Self {
        Self::Upload {
            platform: platform.into(),
            source,
        }
    }

    /// Taxonomy name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Download(_) => "DownloadError",
            WorkerError::Analysis(_) => "AnalysisError",
            WorkerError::Planning(_) => "PlanningError",
            WorkerError::Render(_) => "RenderError",
            WorkerError::Upload { .. } => "UploadError",
            WorkerError::Queue(_) => "QueueError",
            WorkerError::Config(_) => "ConfigError",
            WorkerError::Timeout(_) => "TimeoutError",
            WorkerError::InvalidTransition(_) => "InvalidTransition",
            WorkerError::Io(_) => "IoError",
        }
    }

    /// Rendered source chain, outermost first, one cause per line.
    pub fn chain(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.kind(), self)];
        let mut source = self.source();
        while let Some(cause) = source {
            lines.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = WorkerError::Timeout(600);
        assert_eq!(err.to_string(), "Job exceeded maximum duration of 600 seconds");
        assert_eq!(err.kind(), "TimeoutError");
    }

    #[test]
    fn test_chain_lists_causes() {
        let err = WorkerError::upload("tiktok", StorageError::upload_failed("bucket gone"));
        let chain = err.chain();
        let lines: Vec<&str> = chain.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("UploadError: Upload of tiktok failed"));
        assert_eq!(lines[1], "caused by: Upload failed: bucket gone");
    }
}
