//! The job queue contract shared by all backends.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use vedit_models::{JobId, JobStatusView, ProgressRecord, QueueState, ResultRecord};

use crate::error::QueueResult;
use crate::job::{ClaimedJob, EnqueueRequest, JobOutcome};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    pub consumer_group: String,
    /// Prefix of job meta, progress and result keys
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vedit:jobs".to_string(),
            consumer_group: "vedit:workers".to_string(),
            key_prefix: "vedit".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

/// Durable hand-off of jobs plus progress/result side channels.
///
/// A claimed job is invisible to every other consumer until released.
/// Only a job that has not been claimed yet can be cancelled.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a job and schedule it. Re-submitting an existing id returns
    /// that id without scheduling it again.
    async fn enqueue(&self, request: EnqueueRequest) -> QueueResult<JobId>;

    /// Hand one pending job to `consumer`, waiting up to `wait` for one.
    async fn claim(&self, consumer: &str, wait: Duration) -> QueueResult<Option<ClaimedJob>>;

    /// Release a claim once the job has finished or failed.
    ///
    /// Returns false, leaving the job untouched, when the claim is no longer
    /// held: the job was reclaimed by a reaper or already released.
    async fn release(&self, job: &ClaimedJob, outcome: JobOutcome) -> QueueResult<bool>;

    async fn put_progress(&self, job_id: &JobId, record: &ProgressRecord) -> QueueResult<()>;

    async fn get_progress(&self, job_id: &JobId) -> QueueResult<Option<ProgressRecord>>;

    async fn put_result(&self, job_id: &JobId, record: &ResultRecord) -> QueueResult<()>;

    /// `None` if absent or expired.
    async fn get_result(&self, job_id: &JobId) -> QueueResult<Option<ResultRecord>>;

    async fn queue_state(&self, job_id: &JobId) -> QueueResult<QueueState>;

    /// Cancel a job that is still queued. Returns false once claimed.
    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool>;

    /// Take over claims older than their job's timeout plus `grace`
    /// (crashed workers).
    ///
    /// Each takeover is a compare-and-set on the observed claim: the job must
    /// still be running under the same claim time. Returned claims carry the
    /// new claim time, so only the reclaiming consumer can release them.
    async fn reclaim_expired(&self, consumer: &str, grace: Duration) -> QueueResult<Vec<ClaimedJob>>;

    /// Best-effort progress write; errors are logged, never returned.
    async fn update_progress(&self, job_id: &JobId, progress: u8, stage: &str, message: &str) {
        let record = ProgressRecord::new(progress, stage, message);
        if let Err(e) = self.put_progress(job_id, &record).await {
            warn!(job_id = %job_id, "Failed to update progress: {}", e);
        }
    }

    /// Best-effort result write; errors are logged, never returned.
    async fn store_result(&self, record: &ResultRecord) {
        if let Err(e) = self.put_result(&record.job_id, record).await {
            warn!(job_id = %record.job_id, "Failed to store result: {}", e);
        }
    }

    /// Merged status view. Never fails: unknown ids yield `not_found`.
    async fn get_status(&self, job_id: &JobId) -> JobStatusView {
        let state = match self.queue_state(job_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to read queue state: {}", e);
                return JobStatusView::unavailable(job_id.clone(), e.to_string());
            }
        };

        let progress = self.get_progress(job_id).await.unwrap_or_else(|e| {
            warn!(job_id = %job_id, "Failed to read progress: {}", e);
            None
        });
        let result = self.get_result(job_id).await.unwrap_or_else(|e| {
            warn!(job_id = %job_id, "Failed to read result: {}", e);
            None
        });

        JobStatusView::merge(job_id.clone(), state, progress, result)
    }
}
