//! Planner service request/response types.

use serde::{Deserialize, Serialize};
use vedit_models::{ContentAnalysis, JobId, JobInput};

/// Request for content analysis of a downloaded source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub job_id: JobId,
    /// Path to the source video on the worker's filesystem
    pub source_path: String,
    pub language: String,
    /// Whether speech should be transcribed
    #[serde(default)]
    pub transcribe: bool,
}

impl AnalyzeRequest {
    /// Transcription is requested whenever captions are.
    pub fn for_job(job_id: &JobId, input: &JobInput, source_path: impl Into<String>) -> Self {
        Self {
            job_id: job_id.clone(),
            source_path: source_path.into(),
            language: input.language.clone(),
            transcribe: input.add_captions,
        }
    }
}

/// Request for an edit plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub job_id: JobId,
    pub template: String,
    pub target_duration: u32,
    pub language: String,
    pub platforms: Vec<String>,
    #[serde(default)]
    pub add_captions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voiceover_text: Option<String>,
    pub analysis: ContentAnalysis,
}

impl PlanRequest {
    pub fn for_job(job_id: &JobId, input: &JobInput, analysis: ContentAnalysis) -> Self {
        Self {
            job_id: job_id.clone(),
            template: input.template.clone(),
            target_duration: input.target_duration,
            language: input.language.clone(),
            platforms: input.unique_platforms(),
            add_captions: input.add_captions,
            voiceover_text: input.voiceover_text.clone(),
            analysis,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_request_carries_job_context() {
        let mut input = JobInput::new("https://example.com/v.mp4")
            .with_platforms(["tiktok", "tiktok", "square"])
            .with_captions(true);
        input.voiceover_text = Some("hello".to_string());

        let id = JobId::from_string("job-7");
        let request = PlanRequest::for_job(&id, &input, ContentAnalysis::default());
        assert_eq!(request.platforms, vec!["tiktok", "square"]);
        assert_eq!(request.template, "default");
        assert_eq!(request.voiceover_text.as_deref(), Some("hello"));

        let analyze = AnalyzeRequest::for_job(&id, &input, "/tmp/src.mp4");
        assert!(analyze.transcribe);
        assert_eq!(analyze.language, "fr");
    }
}
