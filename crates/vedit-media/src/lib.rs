//! FFmpeg CLI wrapper for the video-edit pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with progress parsing
//! - FFprobe inspection
//! - Platform renders with a simplified fallback path
//! - SRT captions, burn-in, background music and thumbnails

pub mod audio;
pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod render;
pub mod subtitles;
pub mod thumbnail;
pub mod tools;

pub use audio::MusicTrack;
pub use command::{FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use render::{
    RenderAttempt, RenderEngine, RenderOutcome, RenderRequest, RenderSettings, RenderedOutput, Renderer,
};
pub use subtitles::{format_srt_timestamp, parse_srt_timestamp, CaptionStyle};
pub use tools::{FfmpegToolchain, MediaTools};
