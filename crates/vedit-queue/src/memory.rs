//! In-process queue backend.
//!
//! Same semantics as the Redis backend, without durability across restarts.
//! Used by tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info};
use validator::Validate;

use vedit_models::records::{PROGRESS_TTL_SECS, RESULT_TTL_SECS};
use vedit_models::{JobId, JobInput, ProgressRecord, QueueState, ResultRecord};

use crate::error::{QueueError, QueueResult};
use crate::job::{ClaimedJob, EnqueueRequest, JobOutcome};
use crate::queue::JobQueue;

#[derive(Debug)]
struct Entry {
    input: JobInput,
    timeout_secs: u64,
    state: QueueState,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    /// Set once the job reaches a terminal state
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Entry>,
    pending: VecDeque<JobId>,
    progress: HashMap<JobId, Expiring<ProgressRecord>>,
    results: HashMap<JobId, Expiring<ResultRecord>>,
}

impl Inner {
    /// Drop terminal jobs and records whose retention has passed.
    fn prune(&mut self, now: Instant) {
        self.jobs
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        self.progress.retain(|_, record| record.expires_at > now);
        self.results.retain(|_, record| record.expires_at > now);
    }
}

/// In-memory [`JobQueue`].
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    progress_ttl: Duration,
    result_ttl: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            progress_ttl: Duration::from_secs(PROGRESS_TTL_SECS),
            result_ttl: Duration::from_secs(RESULT_TTL_SECS),
        }
    }

    /// Override record retention windows.
    pub fn with_retention(mut self, progress_ttl: Duration, result_ttl: Duration) -> Self {
        self.progress_ttl = progress_ttl;
        self.result_ttl = result_ttl;
        self
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| QueueError::unavailable("queue state lock poisoned"))
    }

    fn try_claim(&self) -> QueueResult<Option<ClaimedJob>> {
        let mut inner = self.lock()?;
        while let Some(job_id) = inner.pending.pop_front() {
            let Some(entry) = inner.jobs.get_mut(&job_id) else {
                continue;
            };
            // Cancelled jobs stay in the index but are skipped here
            if entry.state != QueueState::Queued {
                continue;
            }
            let now = Utc::now();
            entry.state = QueueState::Running;
            entry.claimed_at = Some(now);
            return Ok(Some(ClaimedJob {
                receipt: job_id.to_string(),
                job_id,
                input: entry.input.clone(),
                timeout_secs: entry.timeout_secs,
                created_at: entry.created_at,
                claimed_at: now,
            }));
        }
        Ok(None)
    }
}

fn read_live<T: Clone>(map: &mut HashMap<JobId, Expiring<T>>, job_id: &JobId) -> Option<T> {
    match map.get(job_id) {
        Some(record) if record.expires_at > Instant::now() => Some(record.value.clone()),
        Some(_) => {
            map.remove(job_id);
            None
        }
        None => None,
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> QueueResult<JobId> {
        request.input.validate()?;
        let job_id = request.job_id.unwrap_or_default();

        {
            let mut inner = self.lock()?;
            inner.prune(Instant::now());
            if inner.jobs.contains_key(&job_id) {
                debug!(job_id = %job_id, "Job already enqueued");
                return Ok(job_id);
            }
            inner.jobs.insert(
                job_id.clone(),
                Entry {
                    input: request.input,
                    timeout_secs: request.timeout_secs,
                    state: QueueState::Queued,
                    created_at: Utc::now(),
                    claimed_at: None,
                    expires_at: None,
                },
            );
            inner.pending.push_back(job_id.clone());
        }

        self.notify.notify_one();
        info!(job_id = %job_id, "Enqueued job");
        Ok(job_id)
    }

    async fn claim(&self, _consumer: &str, wait: Duration) -> QueueResult<Option<ClaimedJob>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(job) = self.try_claim()? {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return self.try_claim();
            }
        }
    }

    async fn release(&self, job: &ClaimedJob, outcome: JobOutcome) -> QueueResult<bool> {
        let mut inner = self.lock()?;
        let entry = inner
            .jobs
            .get_mut(&job.job_id)
            .ok_or_else(|| QueueError::JobNotFound(job.job_id.to_string()))?;
        if entry.state != QueueState::Running || entry.claimed_at != Some(job.claimed_at) {
            debug!(job_id = %job.job_id, "Claim no longer held, not releasing");
            return Ok(false);
        }
        entry.state = outcome.queue_state();
        entry.expires_at = Some(Instant::now() + self.result_ttl);
        Ok(true)
    }

    async fn put_progress(&self, job_id: &JobId, record: &ProgressRecord) -> QueueResult<()> {
        let expires_at = Instant::now() + self.progress_ttl;
        self.lock()?.progress.insert(
            job_id.clone(),
            Expiring {
                value: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_progress(&self, job_id: &JobId) -> QueueResult<Option<ProgressRecord>> {
        Ok(read_live(&mut self.lock()?.progress, job_id))
    }

    async fn put_result(&self, job_id: &JobId, record: &ResultRecord) -> QueueResult<()> {
        let expires_at = Instant::now() + self.result_ttl;
        self.lock()?.results.insert(
            job_id.clone(),
            Expiring {
                value: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_result(&self, job_id: &JobId) -> QueueResult<Option<ResultRecord>> {
        Ok(read_live(&mut self.lock()?.results, job_id))
    }

    async fn queue_state(&self, job_id: &JobId) -> QueueResult<QueueState> {
        let mut inner = self.lock()?;
        inner.prune(Instant::now());
        Ok(inner
            .jobs
            .get(job_id)
            .map(|e| e.state)
            .unwrap_or(QueueState::NotFound))
    }

    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut inner = self.lock()?;
        match inner.jobs.get_mut(job_id) {
            Some(entry) if entry.state == QueueState::Queued => {
                entry.state = QueueState::Cancelled;
                entry.expires_at = Some(Instant::now() + self.result_ttl);
                inner.pending.retain(|id| id != job_id);
                info!(job_id = %job_id, "Cancelled queued job");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reclaim_expired(&self, consumer: &str, grace: Duration) -> QueueResult<Vec<ClaimedJob>> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let mut reclaimed = Vec::new();

        // Observation and takeover happen under one lock, so the check on
        // state and claim time cannot go stale in between
        for (job_id, entry) in inner.jobs.iter_mut() {
            if entry.state != QueueState::Running {
                continue;
            }
            let Some(claimed_at) = entry.claimed_at else {
                continue;
            };
            let mut claim = ClaimedJob {
                job_id: job_id.clone(),
                input: entry.input.clone(),
                timeout_secs: entry.timeout_secs,
                created_at: entry.created_at,
                claimed_at,
                receipt: job_id.to_string(),
            };
            if claim.is_abandoned(now, grace) {
                // The previous holder's release no longer matches
                entry.claimed_at = Some(now);
                claim.claimed_at = now;
                info!(job_id = %job_id, consumer, "Reclaimed expired job");
                reclaimed.push(claim);
            }
        }

        Ok(reclaimed)
    }
}
