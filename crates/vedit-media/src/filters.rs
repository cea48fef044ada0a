//! FFmpeg filter graphs for platform renders.

use vedit_models::encoding::FADE_DURATION_SECS;
use vedit_models::{ColorGradePreset, PlatformSpec};

/// Fixed filter for a color-grade preset.
pub fn color_grade_filter(preset: ColorGradePreset) -> &'static str {
    match preset {
        ColorGradePreset::Natural => "eq=saturation=1.0:contrast=1.0:brightness=0.0",
        ColorGradePreset::Vibrant => "eq=saturation=1.3:contrast=1.1:brightness=0.05",
        ColorGradePreset::Warm => "colorbalance=rs=0.1:bs=-0.1:rm=0.1:bm=-0.1",
        ColorGradePreset::Cinematic => "eq=saturation=0.9:contrast=1.15,colorbalance=rs=-0.05:bs=0.1",
        ColorGradePreset::Bright => "eq=brightness=0.1:contrast=1.05:saturation=1.1",
    }
}

/// Scale to cover the frame, center-crop to it, then set the frame rate.
pub fn fit_filter(spec: &PlatformSpec) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps}",
        w = spec.width,
        h = spec.height,
        fps = spec.fps
    )
}

/// Fade in from black at the start and out at the end.
pub fn fade_filters(duration: f64) -> String {
    let fade_out_start = (duration - FADE_DURATION_SECS).max(0.0);
    format!(
        "fade=t=in:st=0:d={d},fade=t=out:st={st}:d={d}",
        d = FADE_DURATION_SECS,
        st = format_secs(fade_out_start)
    )
}

/// Video chain of the primary render:
/// trim, timestamp reset, fit, optional grade, fades.
pub fn primary_video_chain(
    spec: &PlatformSpec,
    duration: f64,
    grade: Option<ColorGradePreset>,
) -> String {
    let mut chain = vec![
        format!("trim=duration={}", format_secs(duration)),
        "setpts=PTS-STARTPTS".to_string(),
        fit_filter(spec),
    ];
    if let Some(preset) = grade {
        chain.push(color_grade_filter(preset).to_string());
    }
    chain.push(fade_filters(duration));
    chain.join(",")
}

/// Audio chain of the primary render: matching trim and timestamp reset only.
pub fn primary_audio_chain(duration: f64) -> String {
    format!(
        "atrim=duration={},asetpts=PTS-STARTPTS",
        format_secs(duration)
    )
}

/// Full `-filter_complex` graph with `[v]` (and `[a]` when audio is present) outputs.
pub fn primary_filter_complex(
    spec: &PlatformSpec,
    duration: f64,
    grade: Option<ColorGradePreset>,
    has_audio: bool,
) -> String {
    let video = format!("[0:v]{}[v]", primary_video_chain(spec, duration, grade));
    if has_audio {
        format!("{};[0:a]{}[a]", video, primary_audio_chain(duration))
    } else {
        video
    }
}

/// `-vf` filter of the simplified fallback render.
pub fn fallback_video_filter(spec: &PlatformSpec) -> String {
    fit_filter(spec)
}

/// Mix a looped music track under the video's own audio.
pub fn music_mix_filter(volume: f64, video_has_audio: bool) -> String {
    if video_has_audio {
        format!(
            "[1:a]volume={:.2}[music];[0:a][music]amix=inputs=2:duration=first:dropout_transition=2[a]",
            volume
        )
    } else {
        format!("[1:a]volume={:.2}[a]", volume)
    }
}

/// Seconds without trailing zeros, e.g. 15 -> "15", 14.5 -> "14.5".
fn format_secs(secs: f64) -> String {
    let s = format!("{:.3}", secs);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reels() -> PlatformSpec {
        PlatformSpec::lookup("instagram_reels")
    }

    #[test]
    fn test_primary_chain_order() {
        let chain = primary_video_chain(&reels(), 15.0, Some(ColorGradePreset::Vibrant));
        assert_eq!(
            chain,
            "trim=duration=15,setpts=PTS-STARTPTS,\
             scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,fps=30,\
             eq=saturation=1.3:contrast=1.1:brightness=0.05,\
             fade=t=in:st=0:d=0.5,fade=t=out:st=14.5:d=0.5"
        );
    }

    #[test]
    fn test_primary_chain_without_grade() {
        let chain = primary_video_chain(&PlatformSpec::lookup("square"), 10.0, None);
        assert!(!chain.contains("eq="));
        assert!(!chain.contains("colorbalance"));
        assert!(chain.contains("crop=1080:1080"));
        assert!(chain.ends_with("fade=t=out:st=9.5:d=0.5"));
    }

    #[test]
    fn test_filter_complex_audio_is_optional() {
        let with_audio = primary_filter_complex(&reels(), 15.0, None, true);
        assert!(with_audio.starts_with("[0:v]trim=duration=15"));
        assert!(with_audio.ends_with(";[0:a]atrim=duration=15,asetpts=PTS-STARTPTS[a]"));

        let silent = primary_filter_complex(&reels(), 15.0, None, false);
        assert!(silent.ends_with("[v]"));
        assert!(!silent.contains("[0:a]"));
    }

    #[test]
    fn test_fallback_has_no_grade_or_fades() {
        let filter = fallback_video_filter(&reels());
        assert_eq!(
            filter,
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,fps=30"
        );
    }

    #[test]
    fn test_short_duration_fade_out_clamped() {
        assert_eq!(fade_filters(0.3), "fade=t=in:st=0:d=0.5,fade=t=out:st=0:d=0.5");
    }

    #[test]
    fn test_grade_presets() {
        assert!(color_grade_filter(ColorGradePreset::Warm).starts_with("colorbalance=rs=0.1:bs=-0.1"));
        assert!(color_grade_filter(ColorGradePreset::Cinematic).contains("contrast=1.15"));
        assert!(color_grade_filter(ColorGradePreset::Bright).contains("brightness=0.1"));
    }

    #[test]
    fn test_music_mix() {
        assert!(music_mix_filter(0.15, true).contains("volume=0.15[music];[0:a][music]amix=inputs=2"));
        assert_eq!(music_mix_filter(0.15, false), "[1:a]volume=0.15[a]");
    }
}
