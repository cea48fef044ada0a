//! Per-platform output geometry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Platform whose spec is used for unknown keys.
pub const DEFAULT_PLATFORM: &str = "instagram_reels";

/// Fixed output geometry/bitrate profile for a distribution platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
}

const VERTICAL_HD: PlatformSpec = PlatformSpec {
    width: 1080,
    height: 1920,
    fps: 30,
    video_bitrate_kbps: 4000,
    audio_bitrate_kbps: 192,
};

/// Static platform table.
const PLATFORM_SPECS: &[(&str, PlatformSpec)] = &[
    ("instagram_reels", VERTICAL_HD),
    ("tiktok", VERTICAL_HD),
    ("youtube_shorts", VERTICAL_HD),
    (
        "square",
        PlatformSpec {
            width: 1080,
            height: 1080,
            fps: 30,
            video_bitrate_kbps: 4000,
            audio_bitrate_kbps: 192,
        },
    ),
    (
        "instagram_feed",
        PlatformSpec {
            width: 1080,
            height: 1350,
            fps: 30,
            video_bitrate_kbps: 4000,
            audio_bitrate_kbps: 192,
        },
    ),
    (
        "youtube",
        PlatformSpec {
            width: 1920,
            height: 1080,
            fps: 30,
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
        },
    ),
    (
        "twitter",
        PlatformSpec {
            width: 1280,
            height: 720,
            fps: 30,
            video_bitrate_kbps: 5000,
            audio_bitrate_kbps: 192,
        },
    ),
];

impl PlatformSpec {
    /// Look up a platform; unknown keys resolve to the `instagram_reels` spec.
    pub fn lookup(platform: &str) -> PlatformSpec {
        Self::get(platform).unwrap_or(VERTICAL_HD)
    }

    /// Exact lookup without the default fallback.
    pub fn get(platform: &str) -> Option<PlatformSpec> {
        PLATFORM_SPECS
            .iter()
            .find(|(name, _)| *name == platform)
            .map(|(_, spec)| *spec)
    }

    /// All known platform keys.
    pub fn known_platforms() -> impl Iterator<Item = &'static str> {
        PLATFORM_SPECS.iter().map(|(name, _)| *name)
    }

    /// Video bitrate as an FFmpeg argument (e.g. "4000k").
    pub fn video_bitrate(&self) -> String {
        format!("{}k", self.video_bitrate_kbps)
    }

    /// Audio bitrate as an FFmpeg argument (e.g. "192k").
    pub fn audio_bitrate(&self) -> String {
        format!("{}k", self.audio_bitrate_kbps)
    }

    /// Aspect ratio reduced to lowest terms, e.g. "9:16".
    pub fn aspect_ratio(&self) -> String {
        let divisor = gcd(self.width, self.height).max(1);
        format!("{}:{}", self.width / divisor, self.height / divisor)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_platforms() {
        for name in ["instagram_reels", "tiktok", "youtube_shorts"] {
            let spec = PlatformSpec::get(name).unwrap();
            assert_eq!((spec.width, spec.height, spec.fps), (1080, 1920, 30));
        }
        let square = PlatformSpec::get("square").unwrap();
        assert_eq!((square.width, square.height, square.fps), (1080, 1080, 30));
    }

    #[test]
    fn test_unknown_platform_uses_instagram_reels() {
        let reels = PlatformSpec::lookup("instagram_reels");
        for key in ["unknown_platform", "", "Instagram_Reels", "snapchat"] {
            assert_eq!(PlatformSpec::lookup(key), reels, "key {key:?}");
        }
    }

    #[test]
    fn test_aspect_ratio() {
        assert_eq!(PlatformSpec::lookup("tiktok").aspect_ratio(), "9:16");
        assert_eq!(PlatformSpec::lookup("square").aspect_ratio(), "1:1");
        assert_eq!(PlatformSpec::lookup("instagram_feed").aspect_ratio(), "4:5");
        assert_eq!(PlatformSpec::lookup("youtube").aspect_ratio(), "16:9");
    }

    #[test]
    fn test_bitrate_args() {
        let spec = PlatformSpec::lookup("tiktok");
        assert_eq!(spec.video_bitrate(), "4000k");
        assert_eq!(spec.audio_bitrate(), "192k");
    }
}
