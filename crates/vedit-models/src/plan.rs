//! Edit plans produced by the planning service.
//!
//! The pipeline treats a plan as read-only input to the renderer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named color-grade presets with fixed parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColorGradePreset {
    Natural,
    Vibrant,
    Warm,
    Cinematic,
    Bright,
}

impl ColorGradePreset {
    /// Parse a preset name; unknown names yield `None` (no grading).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "natural" => Some(ColorGradePreset::Natural),
            "vibrant" => Some(ColorGradePreset::Vibrant),
            "warm" => Some(ColorGradePreset::Warm),
            "cinematic" => Some(ColorGradePreset::Cinematic),
            "bright" => Some(ColorGradePreset::Bright),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorGradePreset::Natural => "natural",
            ColorGradePreset::Vibrant => "vibrant",
            ColorGradePreset::Warm => "warm",
            ColorGradePreset::Cinematic => "cinematic",
            ColorGradePreset::Bright => "bright",
        }
    }
}

impl std::fmt::Display for ColorGradePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A timed caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Caption {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl Caption {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A single edit operation. Consumed opaquely by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditAction {
    Trim { start: f64, end: f64 },
    SceneCut { at: f64 },
    #[serde(other)]
    Other,
}

/// Structured description of how to trim, grade and caption the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditPlan {
    /// Target duration in seconds
    #[serde(default)]
    pub target_duration: f64,

    /// Color-grade preset name as returned by the planner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_grade_preset: Option<String>,

    #[serde(default)]
    pub captions: Vec<Caption>,

    #[serde(default)]
    pub actions: Vec<EditAction>,
}

impl EditPlan {
    /// Create an empty plan for the given duration.
    pub fn new(target_duration: f64) -> Self {
        Self {
            target_duration,
            ..Default::default()
        }
    }

    /// Set the color-grade preset name.
    pub fn with_color_grade(mut self, preset: impl Into<String>) -> Self {
        self.color_grade_preset = Some(preset.into());
        self
    }

    /// Set captions.
    pub fn with_captions(mut self, captions: Vec<Caption>) -> Self {
        self.captions = captions;
        self
    }

    /// Resolved color grade; unknown preset names are treated as absent.
    pub fn color_grade(&self) -> Option<ColorGradePreset> {
        self.color_grade_preset
            .as_deref()
            .and_then(ColorGradePreset::parse)
    }

    /// Duration to render, falling back to the job's requested duration.
    pub fn render_duration(&self, requested_secs: u32) -> f64 {
        if self.target_duration.is_finite() && self.target_duration > 0.0 {
            self.target_duration
        } else {
            requested_secs as f64
        }
    }

    /// Captions ordered by start, without empty/inverted entries or overlaps,
    /// and limited to `max_duration`.
    pub fn normalized_captions(&self, max_duration: f64) -> Vec<Caption> {
        let mut captions: Vec<Caption> = self
            .captions
            .iter()
            .filter(|c| {
                c.start.is_finite()
                    && c.end.is_finite()
                    && c.start >= 0.0
                    && c.start < c.end
                    && c.start < max_duration
                    && !c.text.trim().is_empty()
            })
            .cloned()
            .collect();

        captions.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut result: Vec<Caption> = Vec::with_capacity(captions.len());
        for mut caption in captions {
            caption.end = caption.end.min(max_duration);
            if let Some(prev) = result.last_mut() {
                if prev.end > caption.start {
                    prev.end = caption.start;
                }
                if prev.end <= prev.start {
                    result.pop();
                }
            }
            result.push(caption);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preset_is_absent() {
        let plan = EditPlan::new(15.0).with_color_grade("sepia");
        assert_eq!(plan.color_grade(), None);

        let plan = EditPlan::new(15.0).with_color_grade("Cinematic");
        assert_eq!(plan.color_grade(), Some(ColorGradePreset::Cinematic));
    }

    #[test]
    fn test_render_duration_falls_back_to_request() {
        assert_eq!(EditPlan::new(12.5).render_duration(15), 12.5);
        assert_eq!(EditPlan::new(0.0).render_duration(15), 15.0);
    }

    #[test]
    fn test_plan_deserializes_with_unknown_actions() {
        let json = r#"{
            "target_duration": 15,
            "color_grade_preset": "warm",
            "captions": [{"start": 0.0, "end": 1.5, "text": "Hello"}],
            "actions": [
                {"type": "trim", "start": 2.0, "end": 17.0},
                {"type": "scene_cut", "at": 5.0},
                {"type": "zoom_punch"}
            ]
        }"#;
        let plan: EditPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.color_grade(), Some(ColorGradePreset::Warm));
        assert_eq!(plan.actions.len(), 3);
        assert_eq!(plan.actions[2], EditAction::Other);
    }

    #[test]
    fn test_normalized_captions() {
        let plan = EditPlan::new(10.0).with_captions(vec![
            Caption::new(4.0, 6.0, "third"),
            Caption::new(0.0, 2.5, "first"),
            Caption::new(2.0, 3.0, "second"),
            Caption::new(5.0, 5.0, "empty range"),
            Caption::new(7.0, 8.0, "   "),
            Caption::new(9.5, 12.0, "clipped"),
            Caption::new(11.0, 12.0, "beyond"),
        ]);

        let captions = plan.normalized_captions(10.0);
        let texts: Vec<&str> = captions.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "clipped"]);
        assert_eq!(captions[0].end, 2.0);
        assert_eq!(captions[3].end, 10.0);
        for pair in captions.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }
}
