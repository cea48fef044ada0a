//! Content analysis results handed from the analysis service to the planner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A timed piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// What the analysis collaborator learned about the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContentAnalysis {
    /// Full transcript text, if speech was transcribed
    #[serde(default)]
    pub transcript: Option<String>,

    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    #[serde(default)]
    pub scenes_detected: u32,

    /// Source duration in seconds, when known
    #[serde(default)]
    pub source_duration: Option<f64>,
}
