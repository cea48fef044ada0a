//! Platform render engine.
//!
//! One source file becomes one output per platform. The primary path runs a
//! full filter graph (trim, fit, grade, fades); if it fails, or produces an
//! empty file, a simplified scale/crop/fps render is attempted at the same
//! path. Only when both fail is the render an error.
//!
//! Every render owns a slot directory. Captions and staging files inside it
//! carry a leading dot, which no sanitized platform stem can produce.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use vedit_models::encoding::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC, FALLBACK_CRF,
};
use vedit_models::{Caption, ColorGradePreset, EditPlan, EncodingProfile, PlatformSpec};

use crate::audio::{music_mix_command, MusicTrack};
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::{fallback_video_filter, primary_filter_complex};
use crate::fs_utils::move_file;
use crate::subtitles::{subtitles_filter, write_srt, CaptionStyle};
use crate::thumbnail::generate_thumbnail;
use crate::tools::MediaTools;

/// Everything needed to render one platform variant.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub source: &'a Path,
    /// Slot directory owned by this render (see [`RenderEngine::slot_dir`]);
    /// created if missing
    pub work_dir: &'a Path,
    pub platform: &'a str,
    pub plan: &'a EditPlan,
    /// Duration requested by the job, used when the plan has none
    pub requested_duration: u32,
    pub add_captions: bool,
    pub add_music: bool,
}

/// A rendered platform variant on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub platform: String,
    pub path: PathBuf,
    pub spec: PlatformSpec,
    /// Rendered duration in seconds
    pub duration: f64,
    pub fallback_used: bool,
}

/// Renders platform variants and thumbnails.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render one platform variant. Errors only when both render paths fail.
    async fn render(&self, request: &RenderRequest<'_>) -> MediaResult<RenderedOutput>;

    /// Extract a thumbnail from a rendered output; `None` on failure.
    async fn thumbnail(&self, rendered: &Path) -> Option<PathBuf>;
}

const STAGING_CAPTIONED: &str = ".captioned.mp4";
const STAGING_MUSIC: &str = ".music.mp4";
const CAPTIONS_FILE: &str = ".captions.srt";

/// A render path still to be tried.
#[derive(Debug)]
pub enum RenderAttempt {
    Primary,
    Fallback { cause: MediaError },
}

/// How a platform render ended.
#[derive(Debug)]
pub enum RenderOutcome {
    Succeeded { fallback_used: bool },
    Failed { primary: MediaError, fallback: MediaError },
}

impl RenderAttempt {
    /// Continue with the next attempt, or stop with the outcome. At most
    /// two attempts are ever made.
    pub fn advance(self, result: MediaResult<()>) -> ControlFlow<RenderOutcome, RenderAttempt> {
        match (self, result) {
            (RenderAttempt::Primary, Ok(())) => ControlFlow::Break(RenderOutcome::Succeeded { fallback_used: false }),
            (RenderAttempt::Primary, Err(cause)) => ControlFlow::Continue(RenderAttempt::Fallback { cause }),
            (RenderAttempt::Fallback { .. }, Ok(())) => {
                ControlFlow::Break(RenderOutcome::Succeeded { fallback_used: true })
            }
            (RenderAttempt::Fallback { cause }, Err(fallback)) => ControlFlow::Break(RenderOutcome::Failed {
                primary: cause,
                fallback,
            }),
        }
    }
}

/// Options that apply to every render, independent of the job.
#[derive(Debug, Clone, Default)]
pub struct RenderSettings {
    pub caption_style: CaptionStyle,
    /// Track mixed in when a job asks for music
    pub music: Option<MusicTrack>,
}

/// FFmpeg-backed [`Renderer`].
pub struct RenderEngine {
    tools: Arc<dyn MediaTools>,
    settings: RenderSettings,
}

impl RenderEngine {
    pub fn new(tools: Arc<dyn MediaTools>, settings: RenderSettings) -> Self {
        Self { tools, settings }
    }

    /// `{root}/renders/{nn}-{stem}`: the slot of the `index`-th platform of a
    /// job. Distinct indexes never share a slot, even when two platform keys
    /// sanitize to the same stem.
    pub fn slot_dir(root: &Path, index: usize, platform: &str) -> PathBuf {
        root.join("renders")
            .join(format!("{:02}-{}", index + 1, file_stem(platform)))
    }

    /// Target path of a platform's render inside its slot.
    pub fn output_path(work_dir: &Path, platform: &str) -> PathBuf {
        work_dir.join(format!("{}.mp4", file_stem(platform)))
    }

    async fn execute(&self, cmd: &FfmpegCommand, output: &Path) -> MediaResult<()> {
        self.tools.run(cmd).await?;
        verify_output(output).await
    }

    /// Probe the source; failures are treated as "has audio, unknown length".
    async fn source_info(&self, source: &Path) -> (bool, Option<f64>) {
        match self.tools.probe(source).await {
            Ok(info) => (info.has_audio, (info.duration > 0.0).then_some(info.duration)),
            Err(e) => {
                warn!("Probe of {} failed, assuming audio is present: {}", source.display(), e);
                (true, None)
            }
        }
    }

    async fn burn_captions(
        &self,
        output: &Path,
        request: &RenderRequest<'_>,
        spec: &PlatformSpec,
        captions: &[Caption],
    ) -> MediaResult<()> {
        let srt_path = request.work_dir.join(CAPTIONS_FILE);
        write_srt(&srt_path, captions).await?;

        let staging = request.work_dir.join(STAGING_CAPTIONED);
        let cmd = FfmpegCommand::new(output, &staging)
            .video_filter(subtitles_filter(&srt_path, &self.settings.caption_style))
            .video_codec(DEFAULT_VIDEO_CODEC)
            .preset(DEFAULT_PRESET)
            .output_arg("-b:v")
            .output_arg(spec.video_bitrate())
            .audio_codec("copy")
            .faststart();

        self.execute(&cmd, &staging).await?;
        move_file(&staging, output).await
    }

    async fn mix_music(
        &self,
        output: &Path,
        request: &RenderRequest<'_>,
        track: &MusicTrack,
        has_audio: bool,
    ) -> MediaResult<()> {
        if !tokio::fs::try_exists(&track.path).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(track.path.clone()));
        }
        let staging = request.work_dir.join(STAGING_MUSIC);
        self.execute(&music_mix_command(output, track, &staging, has_audio), &staging)
            .await?;
        move_file(&staging, output).await
    }
}

#[async_trait]
impl Renderer for RenderEngine {
    async fn render(&self, request: &RenderRequest<'_>) -> MediaResult<RenderedOutput> {
        let spec = PlatformSpec::lookup(request.platform);
        tokio::fs::create_dir_all(request.work_dir).await?;
        let output = Self::output_path(request.work_dir, request.platform);
        let (has_audio, source_duration) = self.source_info(request.source).await;

        let mut duration = request.plan.render_duration(request.requested_duration);
        if let Some(available) = source_duration {
            duration = duration.min(available);
        }
        let grade = request.plan.color_grade();

        info!(
            platform = request.platform,
            width = spec.width,
            height = spec.height,
            duration,
            "Rendering platform output"
        );

        let mut attempt = RenderAttempt::Primary;
        let fallback_used = loop {
            let cmd = match &attempt {
                RenderAttempt::Primary => primary_command(request.source, &output, &spec, duration, grade, has_audio),
                RenderAttempt::Fallback { cause } => {
                    warn!(
                        platform = request.platform,
                        "Primary render failed, using simplified render: {}", cause
                    );
                    fallback_command(request.source, &output, &spec, duration)
                }
            };
            let result = self.execute(&cmd, &output).await;

            attempt = match attempt.advance(result) {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(RenderOutcome::Succeeded { fallback_used }) => break fallback_used,
                ControlFlow::Break(RenderOutcome::Failed { primary, fallback }) => {
                    return Err(MediaError::render_failed(request.platform, primary, fallback));
                }
            };
        };

        if !fallback_used {
            if request.add_captions {
                let captions = request.plan.normalized_captions(duration);
                if captions.is_empty() {
                    debug!(platform = request.platform, "No captions to burn");
                } else if let Err(e) = self.burn_captions(&output, request, &spec, &captions).await {
                    warn!(
                        platform = request.platform,
                        "Caption burn-in failed, keeping uncaptioned video: {}", e
                    );
                }
            }

            if request.add_music {
                match &self.settings.music {
                    Some(track) => {
                        if let Err(e) = self.mix_music(&output, request, track, has_audio).await {
                            warn!(platform = request.platform, "Music mix failed, keeping original audio: {}", e);
                        }
                    }
                    None => debug!("Music requested but no track configured"),
                }
            }
        }

        Ok(RenderedOutput {
            platform: request.platform.to_string(),
            path: output,
            spec,
            duration,
            fallback_used,
        })
    }

    async fn thumbnail(&self, rendered: &Path) -> Option<PathBuf> {
        match generate_thumbnail(self.tools.as_ref(), rendered).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Thumbnail generation failed for {}: {}", rendered.display(), e);
                None
            }
        }
    }
}

/// Full filter-graph render.
pub fn primary_command(
    source: &Path,
    output: &Path,
    spec: &PlatformSpec,
    duration: f64,
    grade: Option<ColorGradePreset>,
    has_audio: bool,
) -> FfmpegCommand {
    let profile = EncodingProfile::default()
        .with_video_bitrate(spec.video_bitrate())
        .with_audio_bitrate(spec.audio_bitrate());

    let mut cmd = FfmpegCommand::new(source, output)
        .filter_complex(primary_filter_complex(spec, duration, grade, has_audio))
        .map("[v]");
    if has_audio {
        cmd = cmd.map("[a]");
    }
    cmd.output_args(profile.to_ffmpeg_args())
}

/// Simplified render: scale/crop/fps only, default quality.
pub fn fallback_command(source: &Path, output: &Path, spec: &PlatformSpec, duration: f64) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .video_filter(fallback_video_filter(spec))
        .duration(duration)
        .video_codec(DEFAULT_VIDEO_CODEC)
        .crf(FALLBACK_CRF)
        .preset(DEFAULT_PRESET)
        .audio_codec(DEFAULT_AUDIO_CODEC)
        .audio_bitrate(DEFAULT_AUDIO_BITRATE)
        .faststart()
}

/// Fail unless `path` exists and is non-empty.
pub async fn verify_output(path: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(MediaError::EmptyOutput(path.to_path_buf())),
    }
}

/// Platform key reduced to filename-safe characters.
fn file_stem(platform: &str) -> String {
    let stem: String = platform
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "output".to_string()
    } else {
        stem
    }
}
