//! Background music mixing.

use std::path::Path;

use vedit_models::encoding::{DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC};

use crate::command::FfmpegCommand;
use crate::filters::music_mix_filter;

/// Background track settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicTrack {
    pub path: std::path::PathBuf,
    /// Linear gain applied to the track (0.0 - 1.0)
    pub volume: f64,
}

/// Mix `track` under `video`, looping the track and keeping the video's length.
///
/// The video stream is copied untouched.
pub fn music_mix_command(
    video: &Path,
    track: &MusicTrack,
    output: &Path,
    video_has_audio: bool,
) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .extra_input(["-stream_loop", "-1"], &track.path)
        .filter_complex(music_mix_filter(track.volume.clamp(0.0, 1.0), video_has_audio))
        .map("0:v")
        .map("[a]")
        .video_codec("copy")
        .audio_codec(DEFAULT_AUDIO_CODEC)
        .audio_bitrate(DEFAULT_AUDIO_BITRATE)
        .output_arg("-shortest")
        .faststart()
}
