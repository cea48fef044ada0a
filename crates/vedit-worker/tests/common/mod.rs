//! Scripted collaborators for driving the pipeline without FFmpeg,
//! object storage or the planner service.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use vedit_media::{
    FfmpegCommand, MediaError, MediaResult, MediaTools, MusicTrack, RenderEngine, RenderSettings, VideoInfo,
};
use vedit_models::{
    ContentAnalysis, EditPlan, JobId, JobStatusView, ProgressRecord, QueueState, ResultRecord,
};
use vedit_planner::{AnalyzeRequest, ContentAnalyzer, EditPlanner, PlanRequest, PlannerError, PlannerResult};
use vedit_queue::{ClaimedJob, EnqueueRequest, JobOutcome, JobQueue, MemoryJobQueue, QueueResult};
use vedit_storage::{MediaStorage, StorageError, StorageResult};
use vedit_worker::{Collaborators, NotificationDispatcher, PipelineOrchestrator, WorkerConfig};

/// FFmpeg stand-in: records every command and writes a small file at
/// the command's output path.
#[derive(Default)]
pub struct FakeTools {
    pub commands: Mutex<Vec<String>>,
    pub fail_primary: bool,
}

impl FakeTools {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let joined = cmd.build_args().join(" ");
        self.commands.lock().unwrap().push(joined.clone());

        if self.fail_primary && joined.contains("-filter_complex [0:v]") {
            return Err(MediaError::ffmpeg_failed("scripted failure", None, Some(1)));
        }
        tokio::fs::write(cmd.output(), b"media").await?;
        Ok(())
    }

    async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
        Ok(VideoInfo {
            duration: 60.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
        })
    }
}

/// Storage stand-in. Locators containing "unreachable" fail to download;
/// uploads fail for keys containing `fail_upload_for`.
#[derive(Default)]
pub struct FakeStorage {
    pub downloads: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub fail_upload_for: Option<String>,
}

impl FakeStorage {
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStorage for FakeStorage {
    async fn download(&self, locator: &str, dest: &Path) -> StorageResult<u64> {
        self.downloads.lock().unwrap().push(locator.to_string());
        if locator.contains("unreachable") {
            return Err(StorageError::download_failed(format!("{}: connection refused", locator)));
        }
        tokio::fs::write(dest, b"source").await?;
        Ok(6)
    }

    async fn upload(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        if let Some(marker) = &self.fail_upload_for {
            if key.contains(marker.as_str()) {
                return Err(StorageError::upload_failed("bucket unavailable"));
            }
        }
        assert!(path.exists(), "uploaded artifact must exist locally");
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{}", key))
    }
}

/// Analyzer/planner stand-in with an optional delay.
pub struct FakePlanner {
    pub plan: EditPlan,
    pub delay: Duration,
    pub fail_planning: bool,
}

impl Default for FakePlanner {
    fn default() -> Self {
        Self {
            plan: EditPlan::new(15.0).with_color_grade("cinematic"),
            delay: Duration::ZERO,
            fail_planning: false,
        }
    }
}

#[async_trait]
impl ContentAnalyzer for FakePlanner {
    async fn analyze(&self, _request: &AnalyzeRequest) -> PlannerResult<ContentAnalysis> {
        Ok(ContentAnalysis {
            transcript: Some("bonjour tout le monde".to_string()),
            segments: Vec::new(),
            scenes_detected: 3,
            source_duration: Some(60.0),
        })
    }
}

#[async_trait]
impl EditPlanner for FakePlanner {
    async fn plan(&self, _request: &PlanRequest) -> PlannerResult<EditPlan> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_planning {
            return Err(PlannerError::RequestFailed("planner rejected template".to_string()));
        }
        Ok(self.plan.clone())
    }
}

/// Memory queue that remembers every progress value written.
#[derive(Default)]
pub struct RecordingQueue {
    pub inner: MemoryJobQueue,
    pub progress_history: Mutex<Vec<(JobId, u8)>>,
}

impl RecordingQueue {
    pub fn history(&self, job_id: &JobId) -> Vec<u8> {
        self.progress_history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> QueueResult<JobId> {
        self.inner.enqueue(request).await
    }

    async fn claim(&self, consumer: &str, wait: Duration) -> QueueResult<Option<ClaimedJob>> {
        self.inner.claim(consumer, wait).await
    }

    async fn release(&self, job: &ClaimedJob, outcome: JobOutcome) -> QueueResult<bool> {
        self.inner.release(job, outcome).await
    }

    async fn put_progress(&self, job_id: &JobId, record: &ProgressRecord) -> QueueResult<()> {
        self.progress_history
            .lock()
            .unwrap()
            .push((job_id.clone(), record.progress));
        self.inner.put_progress(job_id, record).await
    }

    async fn get_progress(&self, job_id: &JobId) -> QueueResult<Option<ProgressRecord>> {
        self.inner.get_progress(job_id).await
    }

    async fn put_result(&self, job_id: &JobId, record: &ResultRecord) -> QueueResult<()> {
        self.inner.put_result(job_id, record).await
    }

    async fn get_result(&self, job_id: &JobId) -> QueueResult<Option<ResultRecord>> {
        self.inner.get_result(job_id).await
    }

    async fn queue_state(&self, job_id: &JobId) -> QueueResult<QueueState> {
        self.inner.queue_state(job_id).await
    }

    async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        self.inner.cancel(job_id).await
    }

    async fn reclaim_expired(&self, consumer: &str, grace: Duration) -> QueueResult<Vec<ClaimedJob>> {
        self.inner.reclaim_expired(consumer, grace).await
    }
}

/// A pipeline wired to fakes, with its own work directory.
pub struct Harness {
    pub queue: Arc<RecordingQueue>,
    pub storage: Arc<FakeStorage>,
    pub tools: Arc<FakeTools>,
    pub config: WorkerConfig,
    pub work_dir: TempDir,
}

impl Harness {
    pub fn new(storage: FakeStorage, tools: FakeTools) -> Self {
        let work_dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            work_dir: work_dir.path().join("jobs"),
            poll_wait: Duration::from_millis(50),
            webhook_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        Self {
            queue: Arc::new(RecordingQueue::default()),
            storage: Arc::new(storage),
            tools: Arc::new(tools),
            config,
            work_dir,
        }
    }

    pub fn pipeline(&self, planner: FakePlanner) -> PipelineOrchestrator {
        self.pipeline_with_settings(planner, RenderSettings::default())
    }

    pub fn pipeline_with_settings(&self, planner: FakePlanner, settings: RenderSettings) -> PipelineOrchestrator {
        let planner = Arc::new(planner);
        let deps = Collaborators {
            queue: self.queue.clone(),
            storage: self.storage.clone(),
            analyzer: planner.clone(),
            planner,
            renderer: Arc::new(RenderEngine::new(self.tools.clone(), settings)),
        };
        let notifier = NotificationDispatcher::new(self.config.webhook_timeout).unwrap();
        PipelineOrchestrator::new(deps, notifier, &self.config)
    }

    pub async fn enqueue_and_claim(&self, request: EnqueueRequest) -> ClaimedJob {
        self.queue.enqueue(request).await.unwrap();
        self.queue
            .claim("test-worker", Duration::from_millis(100))
            .await
            .unwrap()
            .expect("job should be claimable")
    }

    pub async fn status(&self, job_id: &JobId) -> JobStatusView {
        self.queue.get_status(job_id).await
    }

    /// Number of entries left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        match std::fs::read_dir(&self.config.work_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub fn work_root(&self) -> PathBuf {
        self.config.work_dir.clone()
    }

    /// Render settings with a music bed written next to the scratch root.
    pub fn music_settings(&self) -> RenderSettings {
        let path = self.work_dir.path().join("bed.mp3");
        std::fs::write(&path, b"music").unwrap();
        RenderSettings {
            music: Some(MusicTrack { path, volume: 0.15 }),
            ..Default::default()
        }
    }
}
