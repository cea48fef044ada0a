//! Job executor.
//!
//! A fixed pool of job slots pulls claims from the queue; each claim runs
//! end-to-end on its own task under the job's time limit. A reaper task
//! periodically force-fails claims abandoned by crashed workers, leaving a
//! grace period past each job's timeout for the result webhook.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vedit_models::{JobId, JobStatus};
use vedit_queue::{ClaimedJob, JobOutcome, JobQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{PipelineOrchestrator, OPERATION};

type InFlight = Arc<Mutex<HashSet<JobId>>>;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    pipeline: Arc<PipelineOrchestrator>,
    job_semaphore: Arc<Semaphore>,
    in_flight: InFlight,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, pipeline: PipelineOrchestrator) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            queue: Arc::clone(pipeline.queue()),
            pipeline: Arc::new(pipeline),
            config,
            job_semaphore,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then wait for
    /// in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        let reaper = self.spawn_reaper();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::config_error("Job semaphore closed"))?
                }
            };

            // Claims are not raced against shutdown so a delivered job is never dropped
            match self.queue.claim(&self.consumer_name, self.config.poll_wait).await {
                Ok(Some(job)) => self.spawn_job(job, permit),
                Ok(None) => {}
                Err(e) => {
                    drop(permit);
                    error!("Failed to claim job: {}", e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        reaper.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout elapsed with {} job(s) still running",
                self.in_flight_count()
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn in_flight_count(&self) -> usize {
        self.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    fn spawn_job(&self, claimed: ClaimedJob, permit: OwnedSemaphorePermit) {
        let pipeline = Arc::clone(&self.pipeline);
        let queue = Arc::clone(&self.queue);
        let semaphore = Arc::clone(&self.job_semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        let max_jobs = self.config.max_concurrent_jobs;
        let time_limit = self.config.time_limit(claimed.timeout_secs);

        if let Ok(mut ids) = in_flight.lock() {
            ids.insert(claimed.job_id.clone());
        }
        metrics::set_jobs_in_flight(self.in_flight_count());

        tokio::spawn(async move {
            Self::execute_job(pipeline, queue, &claimed, time_limit).await;

            if let Ok(mut ids) = in_flight.lock() {
                ids.remove(&claimed.job_id);
            }
            drop(permit);
            metrics::set_jobs_in_flight(max_jobs - semaphore.available_permits());
        });
    }

    /// Execute a single job and release its claim.
    async fn execute_job(
        pipeline: Arc<PipelineOrchestrator>,
        queue: Arc<dyn JobQueue>,
        claimed: &ClaimedJob,
        time_limit: Duration,
    ) {
        let span = JobLogger::new(&claimed.job_id, OPERATION).span();
        info!(job_id = %claimed.job_id, "Executing job");

        let outcome = match pipeline.run(claimed, time_limit).instrument(span).await {
            Ok(_) => {
                info!(job_id = %claimed.job_id, "Job completed successfully");
                JobOutcome::Finished
            }
            Err(e) => {
                error!(job_id = %claimed.job_id, kind = e.kind(), "Job failed: {}", e);
                JobOutcome::Failed
            }
        };

        match queue.release(claimed, outcome).await {
            Ok(true) => {}
            Ok(false) => warn!(job_id = %claimed.job_id, "Claim was taken over before release"),
            Err(e) => error!(job_id = %claimed.job_id, "Failed to release job: {}", e),
        }
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);
        let consumer = self.consumer_name.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.claim_interval.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = Self::reap(&queue, &pipeline, &in_flight, &consumer, &config).await {
                            warn!("Failed to reclaim abandoned jobs: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Force-fail claims abandoned by crashed workers. Returns how many
    /// jobs were failed.
    pub async fn reap_once(&self) -> WorkerResult<usize> {
        Self::reap(
            &self.queue,
            &self.pipeline,
            &self.in_flight,
            &self.consumer_name,
            &self.config,
        )
        .await
    }

    async fn reap(
        queue: &Arc<dyn JobQueue>,
        pipeline: &PipelineOrchestrator,
        in_flight: &InFlight,
        consumer: &str,
        config: &WorkerConfig,
    ) -> WorkerResult<usize> {
        let claims = queue.reclaim_expired(consumer, config.reclaim_grace()).await?;
        let mut failed = 0;

        for claimed in claims {
            let running_here = in_flight
                .lock()
                .map(|ids| ids.contains(&claimed.job_id))
                .unwrap_or(false);
            if running_here {
                debug!(job_id = %claimed.job_id, "Expired claim is still running locally");
                continue;
            }

            // The worker got as far as a terminal result but never released
            let stored = queue.get_result(&claimed.job_id).await.ok().flatten();
            if let Some(result) = stored.filter(|r| r.status.is_terminal()) {
                let outcome = if result.status == JobStatus::Completed {
                    JobOutcome::Finished
                } else {
                    JobOutcome::Failed
                };
                info!(job_id = %claimed.job_id, status = result.status.as_str(), "Reclaimed job already has a result");
                if let Err(e) = queue.release(&claimed, outcome).await {
                    error!(job_id = %claimed.job_id, "Failed to release reclaimed job: {}", e);
                }
                continue;
            }

            warn!(job_id = %claimed.job_id, "Reclaimed abandoned job, marking failed");
            pipeline
                .fail_abandoned(&claimed, config.time_limit(claimed.timeout_secs))
                .await;
            match queue.release(&claimed, JobOutcome::Failed).await {
                Ok(true) => failed += 1,
                Ok(false) => warn!(job_id = %claimed.job_id, "Reclaimed job was released elsewhere"),
                Err(e) => error!(job_id = %claimed.job_id, "Failed to release reclaimed job: {}", e),
            }
        }

        if failed > 0 {
            info!("Force-failed {} abandoned job(s)", failed);
        }
        Ok(failed)
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        let total = self.config.max_concurrent_jobs as u32;
        let _ = self.job_semaphore.acquire_many(total).await;
    }
}
