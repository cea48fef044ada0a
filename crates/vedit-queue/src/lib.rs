//! Durable job queue for the video-edit pipeline.
//!
//! This crate provides:
//! - The `JobQueue` contract: enqueue, claim, release, cancel
//! - Progress and result records with retention windows
//! - A Redis Streams backend and an in-memory backend

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use job::{ClaimedJob, EnqueueRequest, JobOutcome, DEFAULT_JOB_TIMEOUT_SECS};
pub use memory::MemoryJobQueue;
pub use queue::{JobQueue, QueueConfig};
pub use redis_queue::RedisJobQueue;
