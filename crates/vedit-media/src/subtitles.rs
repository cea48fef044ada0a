//! SRT caption files and subtitle burn-in.

use std::fmt::Write as _;
use std::path::Path;

use vedit_models::Caption;

use crate::error::MediaResult;

/// Caption appearance when burned into the video.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_size: u32,
    /// `#RRGGBB`
    pub font_color: String,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 24,
            font_color: "#FFFFFF".to_string(),
        }
    }
}

impl CaptionStyle {
    /// `force_style` value for the subtitles filter.
    pub fn force_style(&self) -> String {
        format!(
            "FontSize={},PrimaryColour={}",
            self.font_size,
            ass_colour(&self.font_color)
        )
    }
}

/// Convert `#RRGGBB` to the ASS `&H00BBGGRR` form; invalid input yields white.
pub fn ass_colour(hex: &str) -> String {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return "&H00FFFFFF".to_string();
    }
    let (r, g, b) = (&hex[0..2], &hex[2..4], &hex[4..6]);
    format!("&H00{}{}{}", b, g, r).to_uppercase()
}

/// Format seconds as `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// Parse an `HH:MM:SS,mmm` timestamp back into seconds.
pub fn parse_srt_timestamp(s: &str) -> Option<f64> {
    let (hms, ms) = s.trim().split_once(',')?;
    let mut parts = hms.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let sec: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || ms.len() != 3 || m >= 60 || sec >= 60 {
        return None;
    }
    let ms: u64 = ms.parse().ok()?;
    Some((h * 3600 + m * 60 + sec) as f64 + ms as f64 / 1000.0)
}

/// Render captions as SRT: 1-indexed, blank line after each entry.
pub fn to_srt(captions: &[Caption]) -> String {
    let mut out = String::new();
    for (i, caption) in captions.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(caption.start),
            format_srt_timestamp(caption.end),
            caption.text.trim()
        );
    }
    out
}

/// Write captions to an SRT file.
pub async fn write_srt(path: &Path, captions: &[Caption]) -> MediaResult<()> {
    tokio::fs::write(path, to_srt(captions)).await?;
    Ok(())
}

/// `subtitles` filter burning `srt_path` with `style`.
pub fn subtitles_filter(srt_path: &Path, style: &CaptionStyle) -> String {
    format!(
        "subtitles='{}':force_style='{}'",
        escape_filter_path(&srt_path.to_string_lossy()),
        style.force_style()
    )
}

/// Escape a path for use inside a quoted filter argument.
fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}
