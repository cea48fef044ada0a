//! The media toolchain seam between the renderer and FFmpeg processes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Executes FFmpeg commands and probes media files.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Run a command to completion; non-zero exit is an error.
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()>;

    /// Probe a media file.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;
}

/// The FFmpeg/FFprobe binaries installed on the host.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    runner: FfmpegRunner,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: impl AsRef<Path>, ffprobe: impl AsRef<Path>) -> Self {
        Self {
            ffmpeg: ffmpeg.as_ref().to_path_buf(),
            ffprobe: ffprobe.as_ref().to_path_buf(),
            runner: FfmpegRunner::new(ffmpeg),
        }
    }

    /// Kill any single FFmpeg process running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    /// Resolve both binaries.
    pub fn check(&self) -> MediaResult<(PathBuf, PathBuf)> {
        let ffmpeg = self.runner.resolve()?;
        let ffprobe = which::which(&self.ffprobe)
            .map_err(|_| MediaError::FfprobeNotFound(self.ffprobe.clone()))?;
        Ok((ffmpeg, ffprobe))
    }

    /// First line of `ffmpeg -version`.
    pub async fn ffmpeg_version(&self) -> MediaResult<String> {
        version_line(&self.ffmpeg).await
    }

    /// First line of `ffprobe -version`.
    pub async fn ffprobe_version(&self) -> MediaResult<String> {
        version_line(&self.ffprobe).await
    }
}

async fn version_line(binary: &Path) -> MediaResult<String> {
    let output = Command::new(binary).arg("-version").output().await?;
    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("{} -version failed", binary.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl MediaTools for FfmpegToolchain {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let output = cmd.output().display().to_string();
        self.runner
            .run_with_progress(cmd, move |p| {
                trace!(output = %output, out_time_ms = p.out_time_ms, speed = p.speed, "FFmpeg progress");
            })
            .await
    }

    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(&self.ffprobe, path).await
    }
}
