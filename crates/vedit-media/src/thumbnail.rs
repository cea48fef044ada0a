//! Thumbnail extraction from rendered outputs.

use std::path::{Path, PathBuf};

use vedit_models::encoding::THUMBNAIL_TIMESTAMP;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::render::verify_output;
use crate::tools::MediaTools;

/// `{dir}/{stem}_thumb.jpg` next to the video.
pub fn thumbnail_path(video_path: &Path) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    video_path.with_file_name(format!("{}_thumb.jpg", stem))
}

/// Extract one frame at the 1-second mark into a JPEG.
pub async fn generate_thumbnail(tools: &dyn MediaTools, video_path: &Path) -> MediaResult<PathBuf> {
    let output_path = thumbnail_path(video_path);

    let cmd = FfmpegCommand::new(video_path, &output_path)
        .seek(THUMBNAIL_TIMESTAMP)
        .single_frame()
        .output_arg("-q:v")
        .output_arg("2");

    tools.run(&cmd).await?;
    verify_output(&output_path).await?;
    Ok(output_path)
}
