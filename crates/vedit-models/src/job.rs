//! Job definitions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::job_status::JobStatus;
use crate::platform::DEFAULT_PLATFORM;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable submission parameters of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobInput {
    /// Source media locator (http(s), r2/s3 key or local file)
    #[validate(length(min = 1))]
    pub source_video_url: String,

    /// Style/template name forwarded to the planner
    #[serde(default = "default_template", alias = "style")]
    pub template: String,

    /// Target duration in seconds
    #[serde(default = "default_target_duration")]
    #[validate(range(min = 1))]
    pub target_duration: u32,

    /// Target platforms; unknown keys fall back to the default spec
    #[serde(default = "default_platforms")]
    #[validate(length(min = 1))]
    pub platforms: Vec<String>,

    /// Language code
    #[serde(default = "default_language")]
    pub language: String,

    /// Burn captions into the rendered video
    #[serde(default)]
    pub add_captions: bool,

    /// Mix background music into the rendered video
    #[serde(default)]
    pub add_music: bool,

    /// Optional voiceover script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voiceover_text: Option<String>,

    /// Optional completion/failure webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub webhook_url: Option<String>,
}

fn default_template() -> String {
    "default".to_string()
}
fn default_target_duration() -> u32 {
    15
}
fn default_platforms() -> Vec<String> {
    vec![DEFAULT_PLATFORM.to_string()]
}
fn default_language() -> String {
    "fr".to_string()
}

impl JobInput {
    /// Create input for a source with all other fields defaulted.
    pub fn new(source_video_url: impl Into<String>) -> Self {
        Self {
            source_video_url: source_video_url.into(),
            template: default_template(),
            target_duration: default_target_duration(),
            platforms: default_platforms(),
            language: default_language(),
            add_captions: false,
            add_music: false,
            voiceover_text: None,
            webhook_url: None,
        }
    }

    /// Set target platforms.
    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Set target duration in seconds.
    pub fn with_target_duration(mut self, seconds: u32) -> Self {
        self.target_duration = seconds;
        self
    }

    /// Set webhook URL.
    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    /// Enable captions.
    pub fn with_captions(mut self, enabled: bool) -> Self {
        self.add_captions = enabled;
        self
    }

    pub fn with_music(mut self, enabled: bool) -> Self {
        self.add_music = enabled;
        self
    }

    /// Platform keys with duplicates removed, first occurrence wins.
    pub fn unique_platforms(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            if !seen.contains(platform) {
                seen.push(platform.clone());
            }
        }
        seen
    }
}

/// A rendered (and possibly uploaded) output for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformOutput {
    pub platform: String,
    /// Rendered duration in seconds
    pub duration: f64,
    /// Aspect ratio as "W:H" reduced form
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    /// Public locator, populated after upload
    #[serde(default)]
    pub video_url: Option<String>,
    /// Public thumbnail locator, if a thumbnail was produced and uploaded
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Whether the simplified fallback render produced this output
    #[serde(default)]
    pub fallback_used: bool,
}

/// The unit of work, mutated only by the worker executing it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Progress (0-100), non-decreasing while active
    pub progress: u8,
    /// Human-readable stage, always consistent with `status`
    pub stage: String,
    pub input: JobInput,
    /// Outputs keyed by platform, filled in as renders complete
    pub outputs: BTreeMap<String, PlatformOutput>,
    /// Append-only, timestamped log lines
    pub logs: Vec<String>,
    pub error: Option<String>,
    /// Error cause chain for diagnostics
    pub error_details: Option<String>,
    pub transcript: Option<String>,
    pub scenes_detected: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job.
    pub fn new(id: JobId, input: JobInput, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            stage: JobStatus::Queued.stage_name().to_string(),
            input,
            outputs: BTreeMap::new(),
            logs: Vec::new(),
            error: None,
            error_details: None,
            transcript: None,
            scenes_detected: 0,
            created_at,
            updated_at: created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `to`, enforcing the allowed-transition table.
    pub fn transition(&mut self, to: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(ModelError::invalid_transition(self.status, to));
        }

        let now = Utc::now();
        if self.status == JobStatus::Queued && to != JobStatus::Cancelled {
            self.started_at.get_or_insert(now);
        }

        self.status = to;
        self.stage = to.stage_name().to_string();
        self.updated_at = now;

        match to {
            JobStatus::Completed => {
                self.progress = 100;
                self.completed_at = Some(now);
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                self.progress = 0;
                self.completed_at = Some(now);
            }
            _ => {}
        }
        Ok(())
    }

    /// Append a timestamped log line.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let now = Utc::now();
        self.logs.push(format!(
            "[{}] {}",
            now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            message.as_ref()
        ));
        self.updated_at = now;
    }

    /// Most recent log line, used as the progress message.
    pub fn last_log(&self) -> Option<&str> {
        self.logs.last().map(String::as_str)
    }

    /// Raise progress; never lowers it and ignores updates once terminal.
    pub fn set_progress(&mut self, progress: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
    }

    /// Record a fatal error and move to `Failed`.
    pub fn fail(&mut self, error: impl Into<String>, details: Option<String>) {
        let error = error.into();
        self.log(format!("Error: {}", error));
        if self.status.can_transition_to(JobStatus::Failed) {
            // Checked above
            let _ = self.transition(JobStatus::Failed);
        }
        self.error = Some(error);
        self.error_details = details;
    }

    /// Record a rendered output.
    pub fn record_output(&mut self, output: PlatformOutput) {
        self.outputs.insert(output.platform.clone(), output);
        self.updated_at = Utc::now();
    }

    /// Outputs in submission order of the platform list.
    pub fn ordered_outputs(&self) -> Vec<&PlatformOutput> {
        self.input
            .unique_platforms()
            .iter()
            .filter_map(|p| self.outputs.get(p))
            .collect()
    }

    /// Seconds between start and completion once terminal.
    pub fn processing_time_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}
