//! Filesystem helpers for replacing rendered files.

use std::path::Path;
use tokio::fs;

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_LINK: i32 = 18;

/// Move `src` over `dst`, creating parent directories.
///
/// Falls back to copy-then-delete when the two paths are on different
/// filesystems. The copy lands in a sibling temp file and is renamed into
/// place so `dst` is never observed half-written.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
            tracing::debug!(
                "Cross-device move, copying {} -> {}",
                src.display(),
                dst.display()
            );
            let staging = dst.with_extension("partial");
            if let Err(e) = fs::copy(src, &staging).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&staging, dst).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after move: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
