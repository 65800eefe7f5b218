//! Tests for the Firestore client and repositories against a mock server.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spotgen_models::{AdRequest, AspectRatio, Job, PlanTier};

use crate::client::{FirestoreClient, FirestoreConfig};
use crate::error::FirestoreError;
use crate::jobs_repo::JobsRepository;
use crate::usage_repo::{ReserveOutcome, UsageRepository};
use crate::types::to_fields;

fn test_config(server: &MockServer) -> FirestoreConfig {
    FirestoreConfig {
        project_id: "test-project".to_string(),
        database_id: "(default)".to_string(),
        timeout: Duration::from_secs(5),
        emulator_host: Some(server.uri()),
    }
}

fn doc_base() -> &'static str {
    "/v1/projects/test-project/databases/(default)/documents"
}

fn request() -> AdRequest {
    AdRequest {
        prompt: "30-second cinematic ad for an eco-friendly water bottle".to_string(),
        duration_secs: 30,
        aspect_ratio: AspectRatio::Landscape,
        start_image_url: None,
        style_reference_url: None,
        disclaimer_text: None,
        idempotency_key: None,
    }
}

fn job_document_body(job: &Job, update_time: &str) -> serde_json::Value {
    serde_json::json!({
        "name": format!("projects/test-project/databases/(default)/documents/jobs/{}", job.job_id),
        "fields": to_fields(job).unwrap(),
        "createTime": "2026-08-01T00:00:00.000000Z",
        "updateTime": update_time,
    })
}

#[test]
fn test_error_from_http_status() {
    assert!(matches!(
        FirestoreError::from_http_status(429, "slow down"),
        FirestoreError::RateLimited(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(503, "unavailable"),
        FirestoreError::ServerError(503, _)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(412, "stale"),
        FirestoreError::PreconditionFailed(_)
    ));
    assert!(!FirestoreError::from_http_status(400, "bad").is_retryable());
}

#[test]
fn test_fully_populated_job_survives_the_value_bridge() {
    use spotgen_models::{
        AudioSpec, CameraAngle, CameraMove, ColorGrade, DisclaimerSpec, DisclaimerTier,
        InflightPrediction, Lighting, Mood, Scene, Script, ShotDescriptors, ShotType, Stage,
        SyncPoint, VisualConstants, VisualStyle,
    };

    let mut job = Job::new("user-1", request(), "user-1:key".to_string());
    job.stage = Stage::ClipGeneration;
    job.script = Some(Script {
        title: "Eco Bottle".to_string(),
        total_duration_secs: 32,
        scenes: vec![Scene {
            scene_number: 1,
            start_time_secs: 0.0,
            duration_secs: 8,
            shot: ShotDescriptors {
                shot_type: ShotType::Wide,
                camera_angle: CameraAngle::EyeLevel,
                camera_move: CameraMove::Tracking,
                lighting: Lighting::GoldenHour,
                color_grade: ColorGrade::Warm,
                mood: Mood::Uplifting,
                visual_style: VisualStyle::Cinematic,
            },
            generation_prompt: "hiker on a ridge at dawn".to_string(),
            start_image_url: None,
        }],
        audio_spec: AudioSpec {
            music_mood: "uplifting".to_string(),
            music_style: "acoustic indie".to_string(),
            voiceover_script: None,
            narrator_script: Some("Adventure in every sip.".to_string()),
            disclaimer_text: None,
            disclaimer_start_offset_secs: None,
            sync_points: vec![SyncPoint {
                time_secs: 8.0,
                description: "bottle reveal".to_string(),
            }],
        },
        visual_constants: VisualConstants {
            subject_archetype: "hiker".to_string(),
            brand_palette: "green".to_string(),
            lighting_arc: "dawn".to_string(),
        },
    });
    job.clip_urls = vec!["users/user-1/jobs/x/clips/scene-001-abc.mp4".to_string()];
    job.disclaimer_spec = Some(DisclaimerSpec {
        tier: DisclaimerTier::Full,
        spoken_text: "May cause drowsiness.".to_string(),
        audio_duration_secs: 6.5,
        playback_speed: 1.4,
    });
    job.inflight = Some(InflightPrediction {
        stage: Stage::ClipGeneration,
        scene_number: Some(2),
        prediction_id: "pred-99".to_string(),
    });

    let fields = to_fields(&job).unwrap();
    let back: Job = crate::types::from_fields(&fields).unwrap();

    assert_eq!(back.job_id, job.job_id);
    assert_eq!(back.stage, Stage::ClipGeneration);
    assert_eq!(back.script, job.script);
    assert_eq!(back.clip_urls, job.clip_urls);
    assert_eq!(back.disclaimer_spec, job.disclaimer_spec);
    assert_eq!(back.inflight, job.inflight);
    assert_eq!(back.created_at, job.created_at);
}

#[tokio::test]
async fn test_load_roundtrips_job_document() {
    let server = MockServer::start().await;
    let job = Job::new("user-1", request(), "user-1:key".to_string());

    Mock::given(method("GET"))
        .and(path(format!("{}/jobs/{}", doc_base(), job.job_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(job_document_body(&job, "2026-08-01T00:00:01.000000Z")),
        )
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = JobsRepository::new(client);

    let stored = repo.load(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.job.job_id, job.job_id);
    assert_eq!(stored.job.user_id, "user-1");
    assert_eq!(stored.job.request.duration_secs, 30);
    assert_eq!(
        stored.update_time.as_deref(),
        Some("2026-08-01T00:00:01.000000Z")
    );
}

#[tokio::test]
async fn test_missing_job_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = JobsRepository::new(client);

    let stored = repo
        .load(&spotgen_models::JobId::from_string("missing"))
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_conditional_save_passes_precondition() {
    let server = MockServer::start().await;
    let job = Job::new("user-1", request(), "user-1:key".to_string());

    Mock::given(method("PATCH"))
        .and(path(format!("{}/jobs/{}", doc_base(), job.job_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(job_document_body(&job, "2026-08-01T00:00:02.000000Z")),
        )
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = JobsRepository::new(client);

    let new_time = repo
        .save_conditional(&job, Some("2026-08-01T00:00:01.000000Z"))
        .await
        .unwrap();
    assert_eq!(new_time.as_deref(), Some("2026-08-01T00:00:02.000000Z"));
}

#[tokio::test]
async fn test_stale_save_reports_precondition_failure() {
    let server = MockServer::start().await;
    let job = Job::new("user-1", request(), "user-1:key".to_string());

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(412).set_body_string("FAILED_PRECONDITION"))
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = JobsRepository::new(client);

    let err = repo
        .save_conditional(&job, Some("stale-time"))
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_reserve_opens_period_with_one_unit_consumed() {
    let server = MockServer::start().await;

    // No usage document yet
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    // Creation succeeds
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/p/databases/d/documents/usage/u",
            "updateTime": "2026-08-01T00:00:01.000000Z",
        })))
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = UsageRepository::new(client);

    match repo.reserve("user-1", PlanTier::Free).await.unwrap() {
        ReserveOutcome::Reserved(usage) => {
            assert_eq!(usage.monthly_quota, 5);
            assert_eq!(usage.quota_remaining, 4);
            assert_eq!(usage.request_count, 1);
        }
        ReserveOutcome::Exhausted(_) => panic!("expected reservation"),
    }
}

#[tokio::test]
async fn test_reserve_exhausted_writes_nothing() {
    let server = MockServer::start().await;

    let mut usage = spotgen_models::Usage::new("user-1", spotgen_models::current_period(), PlanTier::Free);
    usage.quota_remaining = 0;
    usage.request_count = 5;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "projects/p/databases/d/documents/usage/u",
            "fields": to_fields(&usage).unwrap(),
            "updateTime": "2026-08-01T00:00:01.000000Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FirestoreClient::new(test_config(&server)).await.unwrap();
    let repo = UsageRepository::new(client);

    match repo.reserve("user-1", PlanTier::Free).await.unwrap() {
        ReserveOutcome::Exhausted(usage) => {
            assert_eq!(usage.quota_remaining, 0);
        }
        ReserveOutcome::Reserved(_) => panic!("expected exhaustion"),
    }
    // No PATCH/POST mocks mounted: any write attempt would have 404'd into
    // an error, so reaching here proves the exhausted path wrote nothing.
}
