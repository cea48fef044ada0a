//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vedit_media::{CaptionStyle, MusicTrack, RenderSettings};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Upper bound on a single job's wall-clock time
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root of the per-job scratch directories
    pub work_dir: PathBuf,
    /// Object key prefix of uploaded outputs
    pub output_prefix: String,
    /// How often abandoned claims are reaped
    pub claim_interval: Duration,
    /// Extra wait past a claim's time limit and webhook timeout before
    /// the claim counts as abandoned
    pub reclaim_margin: Duration,
    /// How long a single claim call blocks waiting for work
    pub poll_wait: Duration,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub webhook_timeout: Duration,
    pub caption_font_size: u32,
    pub caption_font_color: String,
    pub music_track_path: Option<PathBuf>,
    pub music_volume: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/vedit"),
            output_prefix: "renders".to_string(),
            claim_interval: Duration::from_secs(30),
            reclaim_margin: Duration::from_secs(30),
            poll_wait: Duration::from_secs(1),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            webhook_timeout: Duration::from_secs(30),
            caption_font_size: 24,
            caption_font_color: "#FFFFFF".to_string(),
            music_track_path: None,
            music_volume: 0.15,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_prefix: std::env::var("WORKER_OUTPUT_PREFIX").unwrap_or(defaults.output_prefix),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            reclaim_margin: env_parse("WORKER_RECLAIM_MARGIN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reclaim_margin),
            poll_wait: defaults.poll_wait,
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
            webhook_timeout: env_parse("WEBHOOK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.webhook_timeout),
            caption_font_size: env_parse("CAPTION_FONT_SIZE").unwrap_or(defaults.caption_font_size),
            caption_font_color: std::env::var("CAPTION_FONT_COLOR")
                .unwrap_or(defaults.caption_font_color),
            music_track_path: std::env::var("MUSIC_TRACK_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            music_volume: env_parse("MUSIC_VOLUME").unwrap_or(defaults.music_volume),
        }
    }

    /// Render options derived from this config. The music track is only
    /// used when the file exists.
    pub fn render_settings(&self) -> RenderSettings {
        let music = self
            .music_track_path
            .as_ref()
            .filter(|path| path.is_file())
            .map(|path| MusicTrack {
                path: path.clone(),
                volume: self.music_volume,
            });

        RenderSettings {
            caption_style: CaptionStyle {
                font_size: self.caption_font_size,
                font_color: self.caption_font_color.clone(),
            },
            music,
        }
    }

    /// Effective time limit of a job given the timeout it was enqueued with.
    pub fn time_limit(&self, enqueued_timeout_secs: u64) -> Duration {
        Duration::from_secs(enqueued_timeout_secs).min(self.job_timeout)
    }

    /// How long past its timeout a claim is left alone. A worker that hit
    /// its time limit still stores the result and waits on the webhook
    /// before releasing.
    pub fn reclaim_grace(&self) -> Duration {
        self.webhook_timeout + self.reclaim_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.output_prefix, "renders");
        assert_eq!(config.caption_font_size, 24);
    }

    #[test]
    fn test_music_requires_existing_file() {
        let config = WorkerConfig {
            music_track_path: Some(PathBuf::from("/nonexistent/track.mp3")),
            ..Default::default()
        };
        assert!(config.render_settings().music.is_none());

        let file = tempfile::NamedTempFile::new().unwrap();
        let config = WorkerConfig {
            music_track_path: Some(file.path().to_path_buf()),
            music_volume: 0.3,
            ..Default::default()
        };
        let music = config.render_settings().music.unwrap();
        assert_eq!(music.volume, 0.3);
    }

    #[test]
    fn test_time_limit_is_capped() {
        let config = WorkerConfig {
            job_timeout: Duration::from_secs(300),
            ..Default::default()
        };
        assert_eq!(config.time_limit(600), Duration::from_secs(300));
        assert_eq!(config.time_limit(60), Duration::from_secs(60));
    }

    #[test]
    fn test_reclaim_grace_covers_webhook() {
        let config = WorkerConfig {
            webhook_timeout: Duration::from_secs(30),
            reclaim_margin: Duration::from_secs(15),
            ..Default::default()
        };
        assert_eq!(config.reclaim_grace(), Duration::from_secs(45));
        assert!(WorkerConfig::default().reclaim_grace() > WorkerConfig::default().webhook_timeout);
    }
}
