//! Pipeline orchestration for a single job.
//!
//! A claimed job is driven through download, analysis, planning, rendering
//! and upload, strictly in that order. Every stage appends a job log line
//! and then publishes progress together with that line. Any fatal error
//! jumps straight to `failed`; the failed result is persisted, the webhook
//! fired, and the error handed back to the executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::warn;

use vedit_media::{RenderEngine, RenderRequest, Renderer};
use vedit_models::{Job, JobId, JobStatus, PlatformOutput, ResultRecord};
use vedit_planner::{AnalyzeRequest, ContentAnalyzer, EditPlanner, PlanRequest};
use vedit_queue::{ClaimedJob, JobQueue};
use vedit_storage::{content_type_for, MediaStorage};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::notify::NotificationDispatcher;

pub(crate) const OPERATION: &str = "video_edit";
const SOURCE_FILE_NAME: &str = "source.mp4";

pub const PROGRESS_DOWNLOADING: u8 = 5;
pub const PROGRESS_ANALYZING: u8 = 25;
pub const PROGRESS_PLANNING: u8 = 50;
pub const PROGRESS_RENDERING: u8 = 75;
pub const PROGRESS_RENDERED: u8 = 95;
pub const PROGRESS_UPLOADING: u8 = 96;

/// External collaborators of the pipeline, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn JobQueue>,
    pub storage: Arc<dyn MediaStorage>,
    pub analyzer: Arc<dyn ContentAnalyzer>,
    pub planner: Arc<dyn EditPlanner>,
    pub renderer: Arc<dyn Renderer>,
}

/// A rendered platform output waiting for upload.
struct Artifact {
    platform: String,
    /// Slot directory name, unique within the job
    slot: String,
    video: PathBuf,
    thumbnail: Option<PathBuf>,
}

/// Progress after platform `done` of `total` has rendered.
pub fn render_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_RENDERED;
    }
    let span = (PROGRESS_RENDERED - PROGRESS_RENDERING) as usize;
    PROGRESS_RENDERING + (span * done.min(total) / total) as u8
}

/// Drives one job at a time through every stage.
pub struct PipelineOrchestrator {
    deps: Collaborators,
    notifier: NotificationDispatcher,
    work_dir: PathBuf,
    output_prefix: String,
}

impl PipelineOrchestrator {
    pub fn new(deps: Collaborators, notifier: NotificationDispatcher, config: &WorkerConfig) -> Self {
        Self {
            deps,
            notifier,
            work_dir: config.work_dir.clone(),
            output_prefix: config.output_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.deps.queue
    }

    /// Run a claimed job to completion or failure within `time_limit`.
    ///
    /// The scratch directory is removed on every exit path, including
    /// timeout.
    pub async fn run(&self, claimed: &ClaimedJob, time_limit: Duration) -> WorkerResult<ResultRecord> {
        let mut job = Job::new(claimed.job_id.clone(), claimed.input.clone(), claimed.created_at);
        let logger = JobLogger::new(&job.id, OPERATION);
        let started = Instant::now();

        logger.started(&job.input.source_video_url, job.input.unique_platforms().len());
        metrics::record_job_started();

        let scratch = match self.scratch_dir(&job.id).await {
            Ok(dir) => dir,
            Err(e) => return Err(self.fail(&mut job, &logger, e, started).await),
        };

        let outcome = match tokio::time::timeout(time_limit, self.execute(&mut job, scratch.path(), &logger)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(WorkerError::Timeout(time_limit.as_secs())),
        };

        let result = match outcome {
            Ok(()) => Ok(self.finish(&job, &logger, started).await),
            Err(e) => Err(self.fail(&mut job, &logger, e, started).await),
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(job_id = %job.id, "Failed to remove scratch dir {}: {}", scratch_path.display(), e);
        }

        result
    }

    /// Force-fail a job whose worker stopped responding.
    pub async fn fail_abandoned(&self, claimed: &ClaimedJob, time_limit: Duration) -> ResultRecord {
        let mut job = Job::new(claimed.job_id.clone(), claimed.input.clone(), claimed.created_at);
        let logger = JobLogger::new(&job.id, OPERATION);

        match self.deps.queue.get_progress(&job.id).await {
            Ok(Some(progress)) => job.log(format!(
                "Last reported stage: {} ({}%)",
                progress.stage, progress.progress
            )),
            Ok(None) => {}
            Err(e) => logger.warning(&format!("Could not read last progress: {}", e)),
        }
        job.log("Worker stopped responding, claim reclaimed");

        self.fail(&mut job, &logger, WorkerError::Timeout(time_limit.as_secs()), Instant::now())
            .await;
        ResultRecord::from_job(&job)
    }

    async fn execute(&self, job: &mut Job, scratch: &Path, logger: &JobLogger) -> WorkerResult<()> {
        // Download
        let stage_started = Instant::now();
        let message = format!("Downloading source video from {}", job.input.source_video_url);
        self.advance(job, logger, JobStatus::Downloading, PROGRESS_DOWNLOADING, &message)
            .await?;
        let source = scratch.join(SOURCE_FILE_NAME);
        let bytes = self
            .deps
            .storage
            .download(&job.input.source_video_url, &source)
            .await
            .map_err(WorkerError::Download)?;
        job.log(format!("Downloaded source video ({:.1} MB)", bytes as f64 / 1_048_576.0));
        metrics::record_stage_duration("download", stage_started.elapsed().as_secs_f64());

        // Analyze
        let stage_started = Instant::now();
        self.advance(job, logger, JobStatus::Analyzing, PROGRESS_ANALYZING, "Analyzing content")
            .await?;
        let request = AnalyzeRequest::for_job(&job.id, &job.input, source.to_string_lossy());
        let analysis = self
            .deps
            .analyzer
            .analyze(&request)
            .await
            .map_err(WorkerError::Analysis)?;
        job.transcript = analysis.transcript.clone();
        job.scenes_detected = analysis.scenes_detected;
        job.log(format!(
            "Analysis complete: {} scenes detected{}",
            analysis.scenes_detected,
            if analysis.transcript.is_some() { ", transcript available" } else { "" }
        ));
        metrics::record_stage_duration("analyze", stage_started.elapsed().as_secs_f64());

        // Plan
        let stage_started = Instant::now();
        let message = format!("Planning edit with template '{}'", job.input.template);
        self.advance(job, logger, JobStatus::Planning, PROGRESS_PLANNING, &message)
            .await?;
        let request = PlanRequest::for_job(&job.id, &job.input, analysis);
        let plan = self
            .deps
            .planner
            .plan(&request)
            .await
            .map_err(WorkerError::Planning)?;
        job.log(format!(
            "Edit plan ready: {:.1}s, color grade {}, {} captions",
            plan.render_duration(job.input.target_duration),
            plan.color_grade().map(|g| g.as_str()).unwrap_or("none"),
            plan.captions.len()
        ));
        metrics::record_stage_duration("plan", stage_started.elapsed().as_secs_f64());

        // Render, one platform at a time in submission order
        let stage_started = Instant::now();
        let platforms = job.input.unique_platforms();
        let message = format!("Rendering {} platform output(s)", platforms.len());
        self.advance(job, logger, JobStatus::Rendering, PROGRESS_RENDERING, &message)
            .await?;

        let mut artifacts = Vec::with_capacity(platforms.len());
        for (i, platform) in platforms.iter().enumerate() {
            let slot_dir = RenderEngine::slot_dir(scratch, i, platform);
            let request = RenderRequest {
                source: &source,
                work_dir: &slot_dir,
                platform,
                plan: &plan,
                requested_duration: job.input.target_duration,
                add_captions: job.input.add_captions,
                add_music: job.input.add_music,
            };
            let rendered = self
                .deps
                .renderer
                .render(&request)
                .await
                .map_err(WorkerError::Render)?;

            if rendered.fallback_used {
                metrics::record_render_fallback(platform);
                job.log(format!("Primary render failed for {}, used simplified render", platform));
            }

            let thumbnail = self.deps.renderer.thumbnail(&rendered.path).await;
            if thumbnail.is_none() {
                logger.warning(&format!("No thumbnail for {}", platform));
                job.log(format!("Thumbnail unavailable for {}", platform));
            }

            job.record_output(PlatformOutput {
                platform: platform.clone(),
                duration: rendered.duration,
                aspect_ratio: rendered.spec.aspect_ratio(),
                width: rendered.spec.width,
                height: rendered.spec.height,
                video_url: None,
                thumbnail_url: None,
                fallback_used: rendered.fallback_used,
            });
            job.log(format!(
                "Rendered {} ({}x{}, {:.1}s)",
                platform, rendered.spec.width, rendered.spec.height, rendered.duration
            ));
            job.set_progress(render_progress(i + 1, platforms.len()));
            self.publish(job).await;

            artifacts.push(Artifact {
                platform: platform.clone(),
                slot: slot_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                video: rendered.path,
                thumbnail,
            });
        }
        metrics::record_stage_duration("render", stage_started.elapsed().as_secs_f64());

        // Upload
        let stage_started = Instant::now();
        let message = format!("Uploading {} output(s)", artifacts.len());
        self.advance(job, logger, JobStatus::Uploading, PROGRESS_UPLOADING, &message)
            .await?;
        for artifact in &artifacts {
            self.upload_artifact(job, logger, artifact).await?;
        }
        metrics::record_stage_duration("upload", stage_started.elapsed().as_secs_f64());

        let message = format!("Completed {} output(s)", artifacts.len());
        self.advance(job, logger, JobStatus::Completed, 100, &message).await
    }

    async fn upload_artifact(&self, job: &mut Job, logger: &JobLogger, artifact: &Artifact) -> WorkerResult<()> {
        if !tokio::fs::try_exists(&artifact.video).await.unwrap_or(false) {
            job.log(format!("Skipping upload of {}: no local file", artifact.platform));
            return Ok(());
        }

        let key = self.object_key(&job.id, &artifact.slot, &artifact.video);
        let video_url = self
            .deps
            .storage
            .upload(&artifact.video, &key, content_type_for(&artifact.video))
            .await
            .map_err(|e| WorkerError::upload(artifact.platform.clone(), e))?;

        let mut thumbnail_url = None;
        if let Some(thumbnail) = &artifact.thumbnail {
            let key = self.object_key(&job.id, &artifact.slot, thumbnail);
            match self
                .deps
                .storage
                .upload(thumbnail, &key, content_type_for(thumbnail))
                .await
            {
                Ok(url) => thumbnail_url = Some(url),
                Err(e) => {
                    logger.warning(&format!("Thumbnail upload failed for {}: {}", artifact.platform, e));
                    job.log(format!("Thumbnail upload failed for {}", artifact.platform));
                }
            }
        }

        if let Some(output) = job.outputs.get_mut(&artifact.platform) {
            output.video_url = Some(video_url);
            output.thumbnail_url = thumbnail_url;
        }
        job.log(format!("Uploaded {}", artifact.platform));
        Ok(())
    }

    /// Log, transition, then publish progress with the new log line.
    async fn advance(
        &self,
        job: &mut Job,
        logger: &JobLogger,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> WorkerResult<()> {
        job.log(message);
        job.transition(status)?;
        job.set_progress(progress);
        logger.stage(status, job.progress, message);
        self.publish(job).await;
        Ok(())
    }

    async fn publish(&self, job: &Job) {
        self.deps
            .queue
            .update_progress(&job.id, job.progress, &job.stage, job.last_log().unwrap_or_default())
            .await;
    }

    async fn finish(&self, job: &Job, logger: &JobLogger, started: Instant) -> ResultRecord {
        let elapsed = started.elapsed();
        let record = ResultRecord::from_job(job);
        self.deps.queue.store_result(&record).await;
        self.notifier.notify(job.input.webhook_url.as_deref(), &record).await;

        metrics::record_job_completed(elapsed.as_secs_f64());
        logger.completed(record.outputs.len(), elapsed);
        record
    }

    /// Record a fatal error on the job, persist and announce it, and hand
    /// the error back.
    async fn fail(&self, job: &mut Job, logger: &JobLogger, error: WorkerError, started: Instant) -> WorkerError {
        logger.failed(error.kind(), &error.to_string());
        job.fail(error.to_string(), Some(error.chain()));
        self.publish(job).await;

        let record = ResultRecord::from_job(job);
        self.deps.queue.store_result(&record).await;
        self.notifier.notify(job.input.webhook_url.as_deref(), &record).await;

        metrics::record_job_failed(error.kind(), started.elapsed().as_secs_f64());
        error
    }

    async fn scratch_dir(&self, job_id: &JobId) -> WorkerResult<TempDir> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let prefix = format!("{}-", sanitize(job_id.as_str()));
        Ok(tempfile::Builder::new().prefix(&prefix).tempdir_in(&self.work_dir)?)
    }

    /// `{prefix}/{job_id}/{slot}/{file name}`.
    fn object_key(&self, job_id: &JobId, slot: &str, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.output_prefix.is_empty() {
            format!("{}/{}/{}", job_id, slot, file_name)
        } else {
            format!("{}/{}/{}/{}", self.output_prefix, job_id, slot, file_name)
        }
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
