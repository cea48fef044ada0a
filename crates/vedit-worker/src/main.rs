//! Video edit worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_media::{FfmpegToolchain, RenderEngine};
use vedit_planner::PlannerClient;
use vedit_queue::RedisJobQueue;
use vedit_storage::StorageClient;
use vedit_worker::{Collaborators, JobExecutor, NotificationDispatcher, PipelineOrchestrator, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vedit-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match vedit_worker::metrics::init_metrics(addr) {
                Ok(()) => info!("Prometheus metrics listening on {}", addr),
                Err(e) => warn!("{}", e),
            },
            Err(e) => warn!("Ignoring invalid METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let executor = match build_executor(config).await {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            error!("Failed to start worker: {}", e);
            std::process::exit(1);
        }
    };

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vedit=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn build_executor(config: WorkerConfig) -> anyhow::Result<JobExecutor> {
    let queue = RedisJobQueue::from_env()?;
    queue.init().await?;

    let tools = FfmpegToolchain::new(&config.ffmpeg_path, &config.ffprobe_path)
        .with_timeout(config.job_timeout.as_secs());
    let (ffmpeg, ffprobe) = tools.check()?;
    info!("Using ffmpeg at {}, ffprobe at {}", ffmpeg.display(), ffprobe.display());

    let planner = Arc::new(PlannerClient::from_env()?);
    match planner.health_check().await {
        Ok(true) => info!("Planner service is healthy"),
        Ok(false) => warn!("Planner service is not healthy yet, jobs will fail at analysis until it is"),
        Err(e) => warn!("Planner service unreachable: {}", e),
    }

    let deps = Collaborators {
        queue: Arc::new(queue),
        storage: Arc::new(StorageClient::from_env()?),
        analyzer: planner.clone(),
        planner,
        renderer: Arc::new(RenderEngine::new(Arc::new(tools), config.render_settings())),
    };
    let notifier = NotificationDispatcher::new(config.webhook_timeout)?;
    let pipeline = PipelineOrchestrator::new(deps, notifier, &config);

    Ok(JobExecutor::new(config, pipeline))
}
