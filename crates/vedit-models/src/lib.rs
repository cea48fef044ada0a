//! Shared data models for the video-edit job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their input parameters and lifecycle status
//! - Edit plans produced by the planning service
//! - Per-platform output geometry
//! - Encoding constants
//! - Progress/result records and webhook payloads

pub mod analysis;
pub mod encoding;
pub mod error;
pub mod job;
pub mod job_status;
pub mod plan;
pub mod platform;
pub mod records;
pub mod webhook;

// Re-export common types
pub use analysis::{ContentAnalysis, TranscriptSegment};
pub use encoding::EncodingProfile;
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobInput, PlatformOutput};
pub use job_status::{JobStatus, QueueState};
pub use plan::{Caption, ColorGradePreset, EditAction, EditPlan};
pub use platform::{PlatformSpec, DEFAULT_PLATFORM};
pub use records::{JobStatusView, OutputEntry, ProgressRecord, ResultRecord};
pub use webhook::{WebhookEvent, WebhookPayload};
