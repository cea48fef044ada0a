//! Redis Streams queue backend.
//!
//! Layout:
//! - `{stream}`: one entry per scheduled job, consumed through a consumer group
//! - `{prefix}:job:{id}`: hash with queue state, input payload and timestamps
//! - `{prefix}:progress:{id}` / `{prefix}:result:{id}`: JSON records with TTLs
//!
//! State changes on the job hash go through Lua scripts so that claim,
//! cancel, reclaim and release race safely: whichever runs first wins.
//! Reclaim and release compare the claim time they observed, so a claim
//! taken over by a reaper can no longer be released by its old holder.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};
use validator::Validate;

use vedit_models::records::{PROGRESS_TTL_SECS, RESULT_TTL_SECS};
use vedit_models::{JobId, JobInput, ProgressRecord, QueueState, ResultRecord};

use crate::error::{QueueError, QueueResult};
use crate::job::{claim_stamp, ClaimedJob, EnqueueRequest, JobOutcome, DEFAULT_JOB_TIMEOUT_SECS};
use crate::queue::{JobQueue, QueueConfig};

/// Create the job hash and stream entry unless the id already exists.
const ENQUEUE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'state', 'queued', 'payload', ARGV[1],
    'timeout_secs', ARGV[2], 'created_at', ARGV[3])
redis.call('EXPIRE', KEYS[1], ARGV[4])
local message_id = redis.call('XADD', KEYS[2], '*', 'job_id', ARGV[5])
redis.call('HSET', KEYS[1], 'message_id', message_id)
return 1
"#;

/// queued -> running
const CLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'queued' then
    return 0
end
redis.call('HSET', KEYS[1], 'state', 'running', 'claimed_at', ARGV[1], 'consumer', ARGV[2])
return 1
"#;

/// queued -> cancelled, dropping the undelivered stream entry.
const CANCEL_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'queued' then
    return 0
end
redis.call('HSET', KEYS[1], 'state', 'cancelled')
local message_id = redis.call('HGET', KEYS[1], 'message_id')
if message_id then
    redis.call('XDEL', KEYS[2], message_id)
end
return 1
"#;

/// Restart a running job's claim under a new consumer if the claim time is
/// still the one observed.
const RECLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'running' then
    return 0
end
if redis.call('HGET', KEYS[1], 'claimed_at') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'claimed_at', ARGV[2], 'consumer', ARGV[3])
return 1
"#;

/// running -> finished/failed for the current claim holder only.
const RELEASE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'running' then
    return 0
end
if redis.call('HGET', KEYS[1], 'claimed_at') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'state', ARGV[2], 'finished_at', ARGV[3])
return 1
"#;

/// Maximum pending entries inspected per reaper pass.
const RECLAIM_SCAN_COUNT: usize = 100;

/// Redis-backed [`JobQueue`].
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group (and stream) if missing.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Number of entries in the job stream.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::unavailable(e.to_string()))
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.config.key_prefix, job_id)
    }

    fn progress_key(&self, job_id: &JobId) -> String {
        format!("{}:progress:{}", self.config.key_prefix, job_id)
    }

    fn result_key(&self, job_id: &JobId) -> String {
        format!("{}:result:{}", self.config.key_prefix, job_id)
    }

    /// Pub/Sub channel carrying live progress records.
    pub fn progress_channel(&self, job_id: &JobId) -> String {
        format!("{}:progress-events:{}", self.config.key_prefix, job_id)
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, message_id: &str) -> QueueResult<()> {
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut *conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    /// Build a claim from the job hash.
    fn claimed_job(
        job_id: &str,
        message_id: &str,
        meta: &HashMap<String, String>,
    ) -> QueueResult<ClaimedJob> {
        let payload = meta
            .get("payload")
            .ok_or_else(|| QueueError::corrupt_record(format!("job {} has no payload", job_id)))?;
        let input: JobInput = serde_json::from_str(payload)?;

        Ok(ClaimedJob {
            job_id: JobId::from_string(job_id),
            input,
            timeout_secs: meta
                .get("timeout_secs")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
            created_at: parse_time(meta.get("created_at")).unwrap_or_else(Utc::now),
            claimed_at: parse_time(meta.get("claimed_at")).unwrap_or_else(Utc::now),
            receipt: message_id.to_string(),
        })
    }

    /// Flip a delivered entry to running; entries for cancelled or expired
    /// jobs are acknowledged and dropped.
    async fn take_entry(
        &self,
        conn: &mut MultiplexedConnection,
        entry: &StreamId,
        consumer: &str,
    ) -> QueueResult<Option<ClaimedJob>> {
        let Some(job_id) = entry.get::<String>("job_id") else {
            warn!("Stream entry {} has no job id, dropping", entry.id);
            self.ack(conn, &entry.id).await?;
            return Ok(None);
        };

        let key = self.job_key(&job_id);
        let claimed: i32 = Script::new(CLAIM_SCRIPT)
            .key(&key)
            .arg(claim_stamp(Utc::now()))
            .arg(consumer)
            .invoke_async(&mut *conn)
            .await?;

        if claimed == 0 {
            debug!(job_id = %job_id, "Skipping entry for job that is no longer queued");
            self.ack(conn, &entry.id).await?;
            return Ok(None);
        }

        let meta: HashMap<String, String> = conn.hgetall(&key).await?;
        Self::claimed_job(&job_id, &entry.id, &meta).map(Some)
    }
}

fn parse_time(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> QueueResult<JobId> {
        request.input.validate()?;
        let job_id = request.job_id.unwrap_or_default();
        let payload = serde_json::to_string(&request.input)?;

        let mut conn = self.conn().await?;
        let created: i32 = Script::new(ENQUEUE_SCRIPT)
            .key(self.job_key(job_id.as_str()))
            .key(&self.config.stream_name)
            .arg(payload)
            .arg(request.timeout_secs)
            .arg(Utc::now().to_rfc3339())
            .arg(RESULT_TTL_SECS)
            .arg(job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            debug!(job_id = %job_id, "Job already enqueued");
        } else {
            info!(job_id = %job_id, "Enqueued job");
        }
        Ok(job_id)
    }

    async fn claim(&self, consumer: &str, wait: Duration) -> QueueResult<Option<ClaimedJob>> {
        let mut conn = self.conn().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            // BLOCK 0 would wait forever
            .arg((wait.as_millis() as u64).max(1))
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream in reply.keys {
            for entry in stream.ids {
                if let Some(job) = self.take_entry(&mut conn, &entry, consumer).await? {
                    info!(job_id = %job.job_id, consumer, "Claimed job");
                    return Ok(Some(job));
                }
            }
        }
        Ok(None)
    }

    async fn release(&self, job: &ClaimedJob, outcome: JobOutcome) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let released: i32 = Script::new(RELEASE_SCRIPT)
            .key(self.job_key(job.job_id.as_str()))
            .arg(job.claim_stamp())
            .arg(outcome.queue_state().as_str())
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            debug!(job_id = %job.job_id, "Claim no longer held, not releasing");
            return Ok(false);
        }
        self.ack(&mut conn, &job.receipt).await?;
        debug!(job_id = %job.job_id, state = %outcome.queue_state(), "Released job");
        Ok(true)
    }

    async fn put_progress(&self, job_id: &JobId, record: &ProgressRecord) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(self.progress_key(job_id), &payload, PROGRESS_TTL_SECS)
            .await?;
        conn.publish::<_, _, ()>(self.progress_channel(job_id), payload).await?;
        Ok(())
    }

    async fn get_progress(&self, job_id: &JobId) -> QueueResult<Option<ProgressRecord>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(self.progress_key(job_id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }

    async fn put_result(&self, job_id: &JobId, record: &ResultRecord) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(self.result_key(job_id), payload, RESULT_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn get_result(&self, job_id: &JobId) -> QueueResult<Option<ResultRecord>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(self.result_key(job_id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }

    async fn queue_state(&self, job_id: &JobId) -> QueueResult<QueueState> {
        let mut conn = self.conn().await?;
        let state: Option<String> = conn.hget(self.job_key(job_id.as_str()), "state").await?;
        Ok(state
            .as_deref()
            .and_then(QueueState::parse)
            .unwrap_or(QueueState::NotFound))
    }

    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let cancelled: i32 = Script::new(CANCEL_SCRIPT)
            .key(self.job_key(job_id.as_str()))
            .key(&self.config.stream_name)
            .invoke_async(&mut conn)
            .await?;
        if cancelled == 1 {
            info!(job_id = %job_id, "Cancelled queued job");
        }
        Ok(cancelled == 1)
    }

    async fn reclaim_expired(&self, consumer: &str, grace: Duration) -> QueueResult<Vec<ClaimedJob>> {
        let mut conn = self.conn().await?;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(RECLAIM_SCAN_COUNT)
            .query_async(&mut conn)
            .await?;

        let mut reclaimed = Vec::new();
        for pending_entry in pending.ids {
            let range: StreamRangeReply = conn
                .xrange(&self.config.stream_name, &pending_entry.id, &pending_entry.id)
                .await?;
            let Some(entry) = range.ids.into_iter().next() else {
                continue;
            };
            let Some(job_id) = entry.get::<String>("job_id") else {
                self.ack(&mut conn, &entry.id).await?;
                continue;
            };

            let meta: HashMap<String, String> = conn.hgetall(self.job_key(&job_id)).await?;
            if meta.get("state").map(String::as_str) != Some(QueueState::Running.as_str()) {
                continue;
            }
            let mut job = match Self::claimed_job(&job_id, &entry.id, &meta) {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id = %job_id, "Dropping unreadable pending job: {}", e);
                    self.ack(&mut conn, &entry.id).await?;
                    continue;
                }
            };
            let now = Utc::now();
            if !job.is_abandoned(now, grace) {
                continue;
            }
            let Some(observed) = meta.get("claimed_at") else {
                continue;
            };

            let new_stamp = claim_stamp(now);
            let taken: i32 = Script::new(RECLAIM_SCRIPT)
                .key(self.job_key(&job_id))
                .arg(observed)
                .arg(&new_stamp)
                .arg(consumer)
                .invoke_async(&mut conn)
                .await?;
            if taken == 0 {
                debug!(job_id = %job_id, "Claim changed since it was read, skipping");
                continue;
            }
            job.claimed_at = parse_time(Some(&new_stamp)).unwrap_or(now);

            let _: StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .arg(consumer)
                .arg(0)
                .arg(&entry.id)
                .query_async(&mut conn)
                .await?;

            info!(job_id = %job_id, previous_consumer = %pending_entry.consumer, "Reclaimed expired job");
            reclaimed.push(job);
        }
        Ok(reclaimed)
    }
}
