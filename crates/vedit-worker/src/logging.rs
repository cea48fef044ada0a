//! Structured job logging.
//!
//! Tracing output for a job's lifecycle. Separate from the job's own
//! append-only log lines, which are persisted with the result.

use std::time::Duration;

use tracing::{error, info, warn, Span};
use vedit_models::{JobId, JobStatus};

/// Emits lifecycle events with the job id and operation as fields, so one
/// job can be filtered out of interleaved worker output.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn started(&self, source: &str, platforms: usize) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            platforms,
            "Job started from {}", source
        );
    }

    /// A stage transition together with the progress it published.
    pub fn stage(&self, status: JobStatus, progress: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            status = status.as_str(),
            progress,
            "{}", message
        );
    }

    /// A non-fatal problem; the job carries on.
    pub fn warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "{}", message
        );
    }

    pub fn failed(&self, kind: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            error_kind = kind,
            "Job failed: {}", message
        );
    }

    pub fn completed(&self, outputs: usize, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            outputs,
            elapsed_secs = elapsed.as_secs_f64(),
            "Job completed"
        );
    }

    /// Span for instrumenting the job's future.
    pub fn span(&self) -> Span {
        tracing::info_span!("vedit_job", job_id = %self.job_id, operation = self.operation)
    }
}
