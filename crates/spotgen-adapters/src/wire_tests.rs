//! Wire-level tests for the prediction protocol against a mock endpoint.

use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::error::AdapterError;
use crate::prediction::{EndpointConfig, PredictionClient, PredictionStatus};

fn client_for(server: &MockServer) -> PredictionClient {
    PredictionClient::new(EndpointConfig {
        name: "test".to_string(),
        base_url: server.uri(),
        api_key: "key".to_string(),
        model_version: "model-v1".to_string(),
        max_concurrency: 2,
    })
    .unwrap()
}

#[tokio::test]
async fn test_submit_sends_version_and_parses_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(body_partial_json(serde_json::json!({"version": "model-v1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "pred-42",
            "status": "starting",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prediction = client_for(&server)
        .submit(serde_json::json!({"prompt": "x"}))
        .await
        .unwrap();
    assert_eq!(prediction.id, "pred-42");
    assert_eq!(prediction.status, PredictionStatus::Starting);
    assert!(prediction.output_url.is_none());
}

#[tokio::test]
async fn test_4xx_is_permanent_bad_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("duration unsupported"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::BadRequest(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(serde_json::json!({}))
        .await
        .unwrap_err();
    match err {
        AdapterError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 7000),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_5xx_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client_for(&server).get_status("pred-1").await.unwrap_err();
    assert!(matches!(err, AdapterError::Transient(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_output_array_normalized_to_first_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/predictions/pred-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pred-1",
            "status": "succeeded",
            "output": ["https://cdn/clip.mp4", "https://cdn/preview.gif"],
        })))
        .mount(&server)
        .await;

    let prediction = client_for(&server).get_status("pred-1").await.unwrap();
    assert_eq!(prediction.status, PredictionStatus::Succeeded);
    assert_eq!(
        prediction.output_url.as_deref(),
        Some("https://cdn/clip.mp4")
    );
}

#[tokio::test]
async fn test_await_prediction_observes_cancellation() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pred-1",
            "status": "processing",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (cancel_tx, cancel_rx) = watch::channel(true);

    let err = client
        .await_prediction("pred-1", Duration::from_secs(60), &cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Cancelled));
    drop(cancel_tx);
}

#[tokio::test]
async fn test_await_prediction_reports_remote_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pred-1",
            "status": "failed",
            "error": "NSFW content detected",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = client
        .await_prediction("pred-1", Duration::from_secs(60), &cancel_rx)
        .await
        .unwrap_err();
    match err {
        AdapterError::PredictionFailed(msg) => assert!(msg.contains("NSFW")),
        other => panic!("expected PredictionFailed, got {other:?}"),
    }
}
