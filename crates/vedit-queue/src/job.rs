//! Queue-level job envelopes.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use vedit_models::{JobId, JobInput, QueueState};

/// Default execution timeout of a job in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// A submission to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Caller-supplied id for idempotent re-submission
    pub job_id: Option<JobId>,
    pub input: JobInput,
    pub timeout_secs: u64,
}

impl EnqueueRequest {
    pub fn new(input: JobInput) -> Self {
        Self {
            job_id: None,
            input,
            timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// A job handed to exactly one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub input: JobInput,
    pub timeout_secs: u64,
    pub created_at: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
    /// Backend receipt used to acknowledge the claim (stream message id)
    pub receipt: String,
}

impl ClaimedJob {
    /// Whether the claim has outlived the job's timeout plus `grace`.
    ///
    /// The grace covers what a healthy worker still does after its time
    /// limit: storing the result, the webhook and the release.
    pub fn is_abandoned(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        let Ok(elapsed) = (now - self.claimed_at).to_std() else {
            return false;
        };
        elapsed >= Duration::from_secs(self.timeout_secs) + grace
    }

    /// Serialized claim time, compared by backends before they hand a
    /// claim to someone else or release it.
    pub fn claim_stamp(&self) -> String {
        claim_stamp(self.claimed_at)
    }
}

/// Microsecond RFC 3339 form of a claim time; parses back to the same value.
pub fn claim_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// How a claimed job ended, from the queue's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Finished,
    Failed,
}

impl JobOutcome {
    pub fn queue_state(&self) -> QueueState {
        match self {
            JobOutcome::Finished => QueueState::Finished,
            JobOutcome::Failed => QueueState::Failed,
        }
    }
}
