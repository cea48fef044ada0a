//! Webhook payloads sent on job completion or failure.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::job_status::JobStatus;
use crate::records::{OutputEntry, ResultRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum WebhookEvent {
    #[serde(rename = "video.job.completed")]
    Completed,
    #[serde(rename = "video.job.failed")]
    Failed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::Completed => "video.job.completed",
            WebhookEvent::Failed => "video.job.failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    pub job_id: JobId,
    pub status: JobStatus,
    pub outputs: Vec<OutputEntry>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    /// Build the payload from a terminal result record.
    pub fn from_result(result: &ResultRecord) -> Self {
        let event = if result.status == JobStatus::Completed {
            WebhookEvent::Completed
        } else {
            WebhookEvent::Failed
        };
        Self {
            event,
            job_id: result.job_id.clone(),
            status: result.status,
            outputs: result.outputs.clone(),
            error: result.error.clone(),
            timestamp: Utc::now(),
        }
    }
}
