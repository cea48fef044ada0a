//! Video edit job worker.
//!
//! This crate provides:
//! - The pipeline orchestrator (download, analyze, plan, render, upload)
//! - Webhook notification on completion or failure
//! - A bounded job executor with per-job timeouts and crash recovery
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod pipeline;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use notify::NotificationDispatcher;
pub use pipeline::{Collaborators, PipelineOrchestrator};
