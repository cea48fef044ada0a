//! Persisted views of a job read by status-polling clients.
//!
//! `ProgressRecord` is ephemeral (24h retention), `ResultRecord` is the full
//! job snapshot (7 day retention). Both are last-writer-wins.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobInput, PlatformOutput};
use crate::job_status::{JobStatus, QueueState};

/// Retention of progress records in seconds.
pub const PROGRESS_TTL_SECS: u64 = 24 * 60 * 60;

/// Retention of result records in seconds.
pub const RESULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Latest progress of a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressRecord {
    pub progress: u8,
    pub stage: String,
    /// Most recent job log line
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(progress: u8, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            progress,
            stage: stage.into(),
            message: message.into(),
            updated_at: Utc::now(),
        }
    }

    /// Snapshot the job's current progress and last log line.
    pub fn from_job(job: &Job) -> Self {
        Self {
            progress: job.progress,
            stage: job.stage.clone(),
            message: job.last_log().unwrap_or_default().to_string(),
            updated_at: job.updated_at,
        }
    }
}

/// One rendered output as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputEntry {
    pub platform: String,
    pub duration: f64,
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl From<&PlatformOutput> for OutputEntry {
    fn from(output: &PlatformOutput) -> Self {
        Self {
            platform: output.platform.clone(),
            duration: output.duration,
            aspect_ratio: output.aspect_ratio.clone(),
            width: output.width,
            height: output.height,
            video_url: output.video_url.clone(),
            thumbnail_url: output.thumbnail_url.clone(),
        }
    }
}

/// Full job snapshot persisted on completion or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input: JobInput,
    pub outputs: Vec<OutputEntry>,
    pub transcript: Option<String>,
    pub scenes_detected: u32,
    pub logs: Vec<String>,
    pub error: Option<String>,
    /// Error cause chain, one cause per line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub processing_time_seconds: Option<f64>,
}

impl ResultRecord {
    /// Snapshot a job. Outputs follow the job's platform order.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            input: job.input.clone(),
            outputs: job.ordered_outputs().into_iter().map(OutputEntry::from).collect(),
            transcript: job.transcript.clone(),
            scenes_detected: job.scenes_detected,
            logs: job.logs.clone(),
            error: job.error.clone(),
            error_details: job.error_details.clone(),
            processing_time_seconds: job.processing_time_seconds(),
        }
    }
}

/// Response to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub job_id: JobId,
    /// Pipeline status when known, otherwise the queue state
    pub status: String,
    pub progress: u8,
    pub current_stage: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<ResultRecord>,
    pub error: Option<String>,
}

impl JobStatusView {
    /// View for an id the queue has never seen.
    pub fn not_found(job_id: JobId) -> Self {
        let error = Some(format!("Job {} not found", job_id));
        Self {
            job_id,
            status: QueueState::NotFound.as_str().to_string(),
            progress: 0,
            current_stage: None,
            created_at: None,
            started_at: None,
            ended_at: None,
            result: None,
            error,
        }
    }

    /// View returned when the backing store could not be read.
    pub fn unavailable(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            status: "unknown".to_string(),
            error: Some(error.into()),
            ..Self::not_found(job_id)
        }
    }

    /// Merge queue-native state with the progress and result records.
    ///
    /// The result record wins over progress, and progress wins over the
    /// bare queue state.
    pub fn merge(
        job_id: JobId,
        state: QueueState,
        progress: Option<ProgressRecord>,
        result: Option<ResultRecord>,
    ) -> Self {
        if state == QueueState::NotFound && progress.is_none() && result.is_none() {
            return Self::not_found(job_id);
        }

        if let Some(result) = result {
            return Self {
                job_id,
                status: result.status.as_str().to_string(),
                progress: result.progress,
                current_stage: Some(result.status.stage_name().to_string()),
                created_at: Some(result.created_at),
                started_at: result.started_at,
                ended_at: result.completed_at,
                error: result.error.clone(),
                result: Some(result),
            };
        }

        let status = match (&progress, state) {
            (_, QueueState::Cancelled) => JobStatus::Cancelled.as_str().to_string(),
            (Some(p), _) => status_for_stage(&p.stage)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| state.as_str().to_string()),
            (None, _) => state.as_str().to_string(),
        };

        Self {
            job_id,
            status,
            progress: progress.as_ref().map(|p| p.progress).unwrap_or(0),
            current_stage: progress.map(|p| p.stage),
            created_at: None,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
        }
    }
}

fn status_for_stage(stage: &str) -> Option<JobStatus> {
    [
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Analyzing,
        JobStatus::Planning,
        JobStatus::Rendering,
        JobStatus::Uploading,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ]
    .into_iter()
    .find(|s| s.stage_name() == stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_job() -> Job {
        let input = JobInput::new("https://example.com/v.mp4").with_platforms(["tiktok", "square"]);
        let mut job = Job::new(JobId::from_string("job-1"), input, Utc::now());
        job.transition(JobStatus::Downloading).unwrap();
        job.log("Downloading source video");
        job.set_progress(5);
        job
    }

    fn output(platform: &str) -> PlatformOutput {
        PlatformOutput {
            platform: platform.to_string(),
            duration: 15.0,
            aspect_ratio: "9:16".to_string(),
            width: 1080,
            height: 1920,
            video_url: Some(format!("https://cdn.example.com/{platform}.mp4")),
            thumbnail_url: None,
            fallback_used: false,
        }
    }

    #[test]
    fn test_progress_record_uses_last_log() {
        let job = running_job();
        let record = ProgressRecord::from_job(&job);
        assert_eq!(record.progress, 5);
        assert_eq!(record.stage, "Downloading source video");
        assert!(record.message.ends_with("Downloading source video"));
    }

    #[test]
    fn test_result_record_orders_outputs_by_platform_list() {
        let mut job = running_job();
        job.record_output(output("square"));
        job.record_output(output("tiktok"));

        let record = ResultRecord::from_job(&job);
        let platforms: Vec<&str> = record.outputs.iter().map(|o| o.platform.as_str()).collect();
        assert_eq!(platforms, vec!["tiktok", "square"]);
    }

    #[test]
    fn test_status_not_found() {
        let view = JobStatusView::merge(JobId::from_string("nope"), QueueState::NotFound, None, None);
        assert_eq!(view.status, "not_found");
        assert!(view.error.is_some());
    }

    #[test]
    fn test_status_prefers_result_over_progress() {
        let mut job = running_job();
        job.fail("boom", None);
        let progress = ProgressRecord::from_job(&running_job());
        let result = ResultRecord::from_job(&job);

        let view = JobStatusView::merge(job.id.clone(), QueueState::Failed, Some(progress), Some(result));
        assert_eq!(view.status, "failed");
        assert_eq!(view.progress, 0);
        assert_eq!(view.error.as_deref(), Some("boom"));
        assert!(view.ended_at.is_some());
    }

    #[test]
    fn test_status_from_progress_stage() {
        let job = running_job();
        let view = JobStatusView::merge(
            job.id.clone(),
            QueueState::Running,
            Some(ProgressRecord::from_job(&job)),
            None,
        );
        assert_eq!(view.status, "downloading");
        assert_eq!(view.progress, 5);
        assert_eq!(view.current_stage.as_deref(), Some("Downloading source video"));
    }

    #[test]
    fn test_status_queued_without_progress() {
        let view = JobStatusView::merge(JobId::from_string("q"), QueueState::Queued, None, None);
        assert_eq!(view.status, "queued");
        assert!(view.error.is_none());
    }
}
