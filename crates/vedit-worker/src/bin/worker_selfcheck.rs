use std::path::Path;

use vedit_media::FfmpegToolchain;
use vedit_storage::{R2Client, R2Config};
use vedit_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_media_tools(&config).await?;
    ensure_env_present(&["REDIS_URL"])?;
    ensure_object_store().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    drop(probe);
    Ok(())
}

async fn ensure_media_tools(config: &WorkerConfig) -> anyhow::Result<()> {
    let tools = FfmpegToolchain::new(&config.ffmpeg_path, &config.ffprobe_path);
    let ffmpeg = tools
        .ffmpeg_version()
        .await
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = tools
        .ffprobe_version()
        .await
        .map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("worker-selfcheck: {}", ffmpeg);
    println!("worker-selfcheck: {}", ffprobe);
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

async fn ensure_object_store() -> anyhow::Result<()> {
    if !R2Config::is_configured() {
        println!("worker-selfcheck: R2 not configured, uploads go to STORAGE_LOCAL_DIR");
        return Ok(());
    }
    let client = R2Client::from_env()?;
    client.check_connectivity().await?;
    println!("worker-selfcheck: bucket {} reachable", client.bucket());
    Ok(())
}
