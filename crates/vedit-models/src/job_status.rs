//! Job lifecycle status and queue-native state.
//!
//! `JobStatus` is the pipeline's view of a job (which stage it is in),
//! `QueueState` is the queue's view (whether a worker holds it). Status
//! polling merges the two.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pipeline status of a job.
///
/// Transitions only move forward through the stages; any non-terminal
/// status may jump to `Failed`, and only `Queued` may become `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Downloading,
    Analyzing,
    Planning,
    Rendering,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Planning => "planning",
            JobStatus::Rendering => "rendering",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable stage name shown to polling clients.
    pub fn stage_name(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Downloading => "Downloading source video",
            JobStatus::Analyzing => "Analyzing content",
            JobStatus::Planning => "Planning edit",
            JobStatus::Rendering => "Rendering outputs",
            JobStatus::Uploading => "Uploading outputs",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The next stage in the forward sequence, if any.
    pub fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Queued => Some(JobStatus::Downloading),
            JobStatus::Downloading => Some(JobStatus::Analyzing),
            JobStatus::Analyzing => Some(JobStatus::Planning),
            JobStatus::Planning => Some(JobStatus::Rendering),
            JobStatus::Rendering => Some(JobStatus::Uploading),
            JobStatus::Uploading => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => None,
        }
    }

    /// Allowed-transition table.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobStatus::Failed => true,
            JobStatus::Cancelled => self == JobStatus::Queued,
            _ => self.next() == Some(to),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue-native state of a job, independent of pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    NotFound,
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::NotFound => "not_found",
            QueueState::Queued => "queued",
            QueueState::Running => "running",
            QueueState::Finished => "finished",
            QueueState::Failed => "failed",
            QueueState::Cancelled => "cancelled",
        }
    }

    /// Parse the stored representation; unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_found" => Some(QueueState::NotFound),
            "queued" => Some(QueueState::Queued),
            "running" => Some(QueueState::Running),
            "finished" => Some(QueueState::Finished),
            "failed" => Some(QueueState::Failed),
            "cancelled" => Some(QueueState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueState::Finished | QueueState::Failed | QueueState::Cancelled
        )
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
