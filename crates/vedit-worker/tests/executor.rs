//! Executor loop and reaper behaviour.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakePlanner, FakeStorage, FakeTools, Harness};
use vedit_models::{JobId, JobInput, JobStatus, QueueState};
use vedit_queue::{EnqueueRequest, JobQueue};
use vedit_worker::{JobExecutor, WorkerConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Executor that treats a claim as abandoned as soon as its timeout passes.
fn impatient_reaper(harness: &Harness) -> JobExecutor {
    let config = WorkerConfig {
        webhook_timeout: Duration::ZERO,
        reclaim_margin: Duration::ZERO,
        ..harness.config.clone()
    };
    JobExecutor::new(config, harness.pipeline(FakePlanner::default()))
}

async fn wait_for_status(harness: &Harness, job_id: &JobId, status: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if harness.status(job_id).await.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never reached {}",
            job_id,
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn executor_processes_queued_jobs_until_shutdown() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let executor = Arc::new(JobExecutor::new(
        harness.config.clone(),
        harness.pipeline(FakePlanner::default()),
    ));

    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    let mut ids = Vec::new();
    for platform in ["tiktok", "square", "youtube_shorts"] {
        let input = JobInput::new("https://example.com/source.mp4").with_platforms([platform]);
        ids.push(harness.queue.enqueue(EnqueueRequest::new(input)).await.unwrap());
    }

    for id in &ids {
        wait_for_status(&harness, id, "completed").await;
    }

    executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("executor should stop after shutdown")
        .unwrap()
        .unwrap();

    for id in &ids {
        assert_eq!(harness.queue.queue_state(id).await.unwrap(), QueueState::Finished);
    }
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn failed_job_releases_claim_as_failed() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let executor = Arc::new(JobExecutor::new(
        harness.config.clone(),
        harness.pipeline(FakePlanner::default()),
    ));
    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    let input = JobInput::new("https://unreachable.invalid/source.mp4");
    let id = harness.queue.enqueue(EnqueueRequest::new(input)).await.unwrap();
    wait_for_status(&harness, &id, "failed").await;

    executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("executor should stop after shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(harness.queue.queue_state(&id).await.unwrap(), QueueState::Failed);
}

#[tokio::test]
async fn reaper_fails_abandoned_claims() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let executor = impatient_reaper(&harness);

    // Claimed by a worker that then disappeared
    let request = EnqueueRequest::new(JobInput::new("https://example.com/source.mp4")).with_timeout(0);
    let claimed = harness.enqueue_and_claim(request).await;
    harness
        .queue
        .update_progress(&claimed.job_id, 50, "Planning edit", "Planning edit")
        .await;

    assert_eq!(executor.reap_once().await.unwrap(), 1);

    let status = harness.status(&claimed.job_id).await;
    assert_eq!(status.status, "failed");
    assert_eq!(status.progress, 0);
    assert!(status
        .error
        .as_deref()
        .is_some_and(|e| e.contains("exceeded maximum duration")));

    let result = status.result.unwrap();
    assert!(result.logs.iter().any(|l| l.contains("Last reported stage: Planning edit (50%)")));
    assert_eq!(
        harness.queue.queue_state(&claimed.job_id).await.unwrap(),
        QueueState::Failed
    );

    // Nothing left to reclaim
    assert_eq!(executor.reap_once().await.unwrap(), 0);
}

#[tokio::test]
async fn reaper_leaves_claim_alone_while_worker_delivers_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(2500)))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let worker = Arc::new(JobExecutor::new(
        harness.config.clone(),
        harness.pipeline(FakePlanner::default()),
    ));
    let reaper = JobExecutor::new(harness.config.clone(), harness.pipeline(FakePlanner::default()));

    let runner = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    // The time limit runs out while the completion webhook is in flight
    let input = JobInput::new("https://example.com/source.mp4").with_webhook(format!("{}/hook", server.uri()));
    let id = harness
        .queue
        .enqueue(EnqueueRequest::new(input).with_timeout(1))
        .await
        .unwrap();
    wait_for_status(&harness, &id, "completed").await;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(harness.queue.queue_state(&id).await.unwrap(), QueueState::Running);
    assert_eq!(reaper.reap_once().await.unwrap(), 0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while harness.queue.queue_state(&id).await.unwrap() != QueueState::Finished {
        assert!(tokio::time::Instant::now() < deadline, "worker never released the job");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let result = harness.queue.get_result(&id).await.unwrap().unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(reaper.reap_once().await.unwrap(), 0);

    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("executor should stop after shutdown")
        .unwrap()
        .unwrap();
    server.verify().await;
}

#[tokio::test]
async fn reaper_keeps_result_of_worker_that_died_before_release() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let input = JobInput::new("https://example.com/source.mp4").with_webhook(format!("{}/hook", server.uri()));
    let claimed = harness
        .enqueue_and_claim(EnqueueRequest::new(input).with_timeout(0))
        .await;

    // Completed and notified, but the claim was never released
    harness
        .pipeline(FakePlanner::default())
        .run(&claimed, Duration::from_secs(30))
        .await
        .unwrap();

    let reaper = impatient_reaper(&harness);
    assert_eq!(reaper.reap_once().await.unwrap(), 0);

    let status = harness.status(&claimed.job_id).await;
    assert_eq!(status.status, "completed");
    assert_eq!(
        harness.queue.queue_state(&claimed.job_id).await.unwrap(),
        QueueState::Finished
    );

    // The stale holder can no longer release
    assert!(!harness
        .queue
        .release(&claimed, vedit_queue::JobOutcome::Failed)
        .await
        .unwrap());
    server.verify().await;
}
