//! End-to-end pipeline scenarios against in-process fakes.

mod common;

use std::time::Duration;

use std::collections::HashSet;

use common::{FakePlanner, FakeStorage, FakeTools, Harness};
use vedit_models::{Caption, EditPlan, JobId, JobInput, JobStatus};
use vedit_queue::{EnqueueRequest, JobQueue};
use vedit_worker::WorkerError;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(input: JobInput) -> EnqueueRequest {
    EnqueueRequest::new(input).with_job_id(JobId::new())
}

fn captioned_planner() -> FakePlanner {
    FakePlanner {
        plan: EditPlan::new(15.0)
            .with_color_grade("cinematic")
            .with_captions(vec![Caption::new(0.0, 2.0, "Bonjour"), Caption::new(2.0, 4.0, "à tous")]),
        ..Default::default()
    }
}

/// Input path and output path of a recorded FFmpeg command line.
fn io_paths(command: &str) -> (&str, &str) {
    let mut tokens = command.split_whitespace();
    let input = tokens.by_ref().skip_while(|t| *t != "-i").nth(1).unwrap_or_default();
    let output = command.split_whitespace().last().unwrap_or_default();
    (input, output)
}

#[tokio::test]
async fn two_vertical_platforms_complete_with_uploaded_outputs() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4")
        .with_platforms(["instagram_reels", "tiktok"])
        .with_target_duration(15);
    let claimed = harness.enqueue_and_claim(request(input)).await;

    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.outputs.len(), 2);
    assert_eq!(record.outputs[0].platform, "instagram_reels");
    assert_eq!(record.outputs[1].platform, "tiktok");
    for output in &record.outputs {
        assert_eq!((output.width, output.height), (1080, 1920));
        assert_eq!(output.aspect_ratio, "9:16");
        assert!(output.video_url.as_deref().is_some_and(|u| !u.is_empty()));
        assert!(output.thumbnail_url.is_some());
    }
    assert_eq!(record.transcript.as_deref(), Some("bonjour tout le monde"));
    assert_eq!(record.scenes_detected, 3);
    assert!(record.processing_time_seconds.is_some());
    assert!(record.error.is_none());

    let key = format!("renders/{}/02-tiktok/tiktok.mp4", claimed.job_id);
    assert!(harness.storage.uploads().contains(&key));

    let status = harness.status(&claimed.job_id).await;
    assert_eq!(status.status, "completed");
    assert_eq!(status.progress, 100);
    assert!(status.result.is_some());

    // Scratch directory released
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn progress_is_monotonic_and_follows_stage_schedule() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["tiktok", "square"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    let history = harness.queue.history(&claimed.job_id);
    assert_eq!(history, vec![5, 25, 50, 75, 85, 95, 96, 100]);
    assert!(history.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn progress_message_is_the_latest_log_line() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let claimed = harness
        .enqueue_and_claim(request(JobInput::new("https://example.com/source.mp4")))
        .await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    let progress = harness
        .queue
        .get_progress(&claimed.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.progress, 100);
    assert_eq!(&progress.message, record.logs.last().unwrap());
    assert!(record.logs.iter().all(|line| line.starts_with('[')));
}

#[tokio::test]
async fn unknown_platform_uses_default_vertical_geometry() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["unknown_platform"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.outputs.len(), 1);
    assert_eq!(record.outputs[0].platform, "unknown_platform");
    assert_eq!((record.outputs[0].width, record.outputs[0].height), (1080, 1920));
}

#[tokio::test]
async fn download_failure_fails_job_before_rendering() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "event": "video.job.failed",
            "status": "failed"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://unreachable.invalid/source.mp4")
        .with_webhook(format!("{}/hook", server.uri()));
    let claimed = harness.enqueue_and_claim(request(input)).await;

    let err = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap_err();
    assert!(matches!(err, WorkerError::Download(_)));

    let status = harness.status(&claimed.job_id).await;
    assert_eq!(status.status, "failed");
    assert_eq!(status.progress, 0);
    assert!(status.error.as_deref().is_some_and(|e| !e.is_empty()));

    let result = status.result.unwrap();
    assert!(result.outputs.is_empty());
    assert!(result.error_details.unwrap().starts_with("DownloadError"));
    assert!(result.logs.last().unwrap().contains("Error: Download failed"));

    assert!(harness.tools.commands().is_empty(), "no render may be attempted");
    assert!(harness.storage.uploads().is_empty(), "no upload may be attempted");
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn planning_failure_is_fatal() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner {
        fail_planning: true,
        ..Default::default()
    });

    let claimed = harness
        .enqueue_and_claim(request(JobInput::new("https://example.com/source.mp4")))
        .await;
    let err = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap_err();
    assert_eq!(err.kind(), "PlanningError");

    let result = harness.queue.get_result(&claimed.job_id).await.unwrap().unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert!(harness.tools.commands().is_empty());
}

#[tokio::test]
async fn primary_render_failure_falls_back_and_completes() {
    let tools = FakeTools {
        fail_primary: true,
        ..Default::default()
    };
    let harness = Harness::new(FakeStorage::default(), tools);
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["square"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!((record.outputs[0].width, record.outputs[0].height), (1080, 1080));
    assert!(record.logs.iter().any(|l| l.contains("used simplified render")));
    assert!(harness.tools.commands().iter().any(|c| c.contains("-crf 23")));
}

#[tokio::test]
async fn upload_failure_keeps_earlier_outputs_queryable() {
    let storage = FakeStorage {
        fail_upload_for: Some("tiktok.mp4".to_string()),
        ..Default::default()
    };
    let harness = Harness::new(storage, FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["square", "tiktok"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let err = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap_err();
    assert!(matches!(err, WorkerError::Upload { ref platform, .. } if platform == "tiktok"));

    let result = harness.queue.get_result(&claimed.job_id).await.unwrap().unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.progress, 0);
    assert_eq!(result.outputs.len(), 2);
    assert!(result.outputs[0].video_url.is_some());
    assert!(result.outputs[1].video_url.is_none());
}

#[tokio::test]
async fn duplicate_platforms_render_once() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["tiktok", "tiktok"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.outputs.len(), 1);
    let video_uploads = harness
        .storage
        .uploads()
        .into_iter()
        .filter(|k| k.ends_with(".mp4"))
        .count();
    assert_eq!(video_uploads, 1);
}

#[tokio::test]
async fn job_exceeding_time_limit_is_force_failed() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner {
        delay: Duration::from_secs(10),
        ..Default::default()
    });

    let claimed = harness
        .enqueue_and_claim(request(JobInput::new("https://example.com/source.mp4")))
        .await;
    let err = pipeline.run(&claimed, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, WorkerError::Timeout(1)));

    let status = harness.status(&claimed.job_id).await;
    assert_eq!(status.status, "failed");
    assert_eq!(status.progress, 0);
    assert_eq!(
        status.error.as_deref(),
        Some("Job exceeded maximum duration of 1 seconds")
    );
    // Logs written before the timeout are kept
    let result = status.result.unwrap();
    assert!(result.logs.iter().any(|l| l.contains("Planning edit")));
    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn cancel_only_succeeds_while_queued() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());

    let queued = harness
        .queue
        .enqueue(request(JobInput::new("https://example.com/a.mp4")))
        .await
        .unwrap();
    assert!(harness.queue.cancel(&queued).await.unwrap());
    assert_eq!(harness.status(&queued).await.status, "cancelled");
    assert!(harness
        .queue
        .claim("test-worker", Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());

    let claimed = harness
        .enqueue_and_claim(request(JobInput::new("https://example.com/b.mp4")))
        .await;
    assert!(!harness.queue.cancel(&claimed.job_id).await.unwrap());
    assert!(!harness.queue.cancel(&JobId::from_string("missing")).await.unwrap());
}

#[tokio::test]
async fn platform_named_source_never_overwrites_the_download() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline(FakePlanner::default());

    let input = JobInput::new("https://example.com/source.mp4").with_platforms(["source", "tiktok"]);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.outputs.len(), 2);

    let commands = harness.tools.commands();
    let renders: Vec<_> = commands
        .iter()
        .filter(|c| c.contains("-filter_complex [0:v]"))
        .map(|c| io_paths(c))
        .collect();
    assert_eq!(renders.len(), 2);
    let (source, _) = renders[0];
    assert!(source.ends_with("source.mp4"));
    for (input, output) in &renders {
        assert_eq!(input, &source, "every platform renders from the download");
        assert_ne!(output, &source);
    }
}

#[tokio::test]
async fn colliding_platform_keys_get_separate_outputs() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline_with_settings(captioned_planner(), harness.music_settings());

    // "tiktok_captioned" matches a staging name, "a.b" and "a_b" share a stem
    let input = JobInput::new("https://example.com/source.mp4")
        .with_platforms(["tiktok_captioned", "tiktok", "a.b", "a_b"])
        .with_captions(true)
        .with_music(true);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.outputs.len(), 4);
    let urls: HashSet<_> = record
        .outputs
        .iter()
        .map(|o| o.video_url.clone().expect("every platform uploaded"))
        .collect();
    assert_eq!(urls.len(), 4);

    let uploads = harness.storage.uploads();
    let unique: HashSet<_> = uploads.iter().collect();
    assert_eq!(unique.len(), uploads.len(), "no object key uploaded twice");

    // No command writes where another one's result lives
    let outputs: Vec<String> = harness
        .tools
        .commands()
        .iter()
        .filter(|c| !c.contains("-vframes 1"))
        .map(|c| io_paths(c).1.to_string())
        .filter(|path| !path.ends_with(".captioned.mp4") && !path.ends_with(".music.mp4"))
        .collect();
    let distinct: HashSet<_> = outputs.iter().collect();
    assert_eq!(outputs.len(), 4);
    assert_eq!(distinct.len(), 4);
}

#[tokio::test]
async fn captions_and_music_are_applied_when_requested() {
    let harness = Harness::new(FakeStorage::default(), FakeTools::default());
    let pipeline = harness.pipeline_with_settings(captioned_planner(), harness.music_settings());

    let input = JobInput::new("https://example.com/source.mp4")
        .with_platforms(["tiktok", "square"])
        .with_captions(true)
        .with_music(true);
    let claimed = harness.enqueue_and_claim(request(input)).await;
    let record = pipeline.run(&claimed, Duration::from_secs(30)).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.logs.iter().any(|l| l.contains("2 captions")));

    let commands = harness.tools.commands();
    assert_eq!(commands.iter().filter(|c| c.contains("subtitles=")).count(), 2);
    assert_eq!(commands.iter().filter(|c| c.contains("amix=inputs=2")).count(), 2);
    // Burn-in runs on the render, music on the captioned render
    let tiktok: Vec<_> = commands.iter().filter(|c| c.contains("01-tiktok")).collect();
    assert!(tiktok[1].contains("subtitles="));
    assert!(tiktok[2].contains("amix=inputs=2"));

    for output in &record.outputs {
        assert!(output.video_url.is_some());
        assert!(!output.fallback_used);
    }
    assert_eq!(harness.scratch_entries(), 0);
}
