//! Shared prediction wire protocol.
//!
//! Every generation endpoint speaks the same shape:
//! `POST /predictions` with `{version, input}` returning `{id, status}`,
//! then `GET /predictions/{id}` until the status is terminal. Statuses are
//! normalized to `{starting, processing, succeeded, failed}` and output is
//! post-processed to a single URL regardless of the endpoint's envelope.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};

/// Timeout for submit and poll HTTP calls.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for artifact downloads (large media).
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive transient poll failures tolerated before surfacing.
const MAX_POLL_FAULTS: u32 = 3;

/// Normalized prediction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
}

impl PredictionStatus {
    /// Normalize an endpoint-specific status string.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "starting" | "queued" | "pending" => PredictionStatus::Starting,
            "processing" | "running" | "in_progress" => PredictionStatus::Processing,
            "succeeded" | "completed" | "success" => PredictionStatus::Succeeded,
            _ => PredictionStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PredictionStatus::Succeeded | PredictionStatus::Failed)
    }
}

/// A prediction as seen by stage workers.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Durable handle; persisted into the job record before polling
    pub id: String,
    pub status: PredictionStatus,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

/// Wire envelope returned by the prediction endpoints.
#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl PredictionEnvelope {
    fn normalize(self) -> Prediction {
        let output_url = self.output.as_ref().and_then(extract_output_url);
        let error = self.error.as_ref().map(|e| match e {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        Prediction {
            id: self.id,
            status: PredictionStatus::from_wire(&self.status),
            output_url,
            error,
        }
    }
}

/// Endpoints return output either as one URL or as an array of URLs.
fn extract_output_url(output: &serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(|i| match i {
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        }),
        serde_json::Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("audio_url"))
            .or_else(|| map.get("video_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// One external prediction endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Short name for logs ("video", "music", "tts")
    pub name: String,
    /// Base URL; predictions live at `{base_url}/predictions`
    pub base_url: String,
    /// Bearer key
    pub api_key: String,
    /// Model version pinned into every submission
    pub model_version: String,
    /// Concurrent in-flight HTTP calls allowed against this endpoint
    pub max_concurrency: usize,
}

/// Client for one prediction endpoint.
///
/// Each endpoint has its own rate budget, so each client carries its own
/// semaphore; clones share it.
#[derive(Clone)]
pub struct PredictionClient {
    config: EndpointConfig,
    http: Client,
    download_http: Client,
    permits: Arc<Semaphore>,
}

impl PredictionClient {
    pub fn new(config: EndpointConfig) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let download_http = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        Ok(Self {
            config,
            http,
            download_http,
            permits,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Submit a prediction.
    pub async fn submit(&self, input: serde_json::Value) -> AdapterResult<Prediction> {
        let _permit = self.acquire().await?;
        let url = format!("{}/predictions", self.config.base_url);

        #[derive(Serialize)]
        struct SubmitBody<'a> {
            version: &'a str,
            input: &'a serde_json::Value,
        }

        debug!(endpoint = %self.config.name, "Submitting prediction");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&SubmitBody {
                version: &self.config.model_version,
                input: &input,
            })
            .send()
            .await
            .map_err(classify_reqwest)?;

        self.parse_envelope(response).await
    }

    /// Fetch the current status of a prediction.
    pub async fn get_status(&self, prediction_id: &str) -> AdapterResult<Prediction> {
        let _permit = self.acquire().await?;
        let url = format!("{}/predictions/{}", self.config.base_url, prediction_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(classify_reqwest)?;

        self.parse_envelope(response).await
    }

    /// Poll a prediction to a terminal status.
    ///
    /// Observes the cancellation flag on every tick and gives up when the
    /// stage deadline elapses. Isolated transient poll failures are
    /// tolerated up to a small budget; a terminal `failed` status maps to
    /// `PredictionFailed`.
    pub async fn await_prediction(
        &self,
        prediction_id: &str,
        deadline: Duration,
        cancel_rx: &watch::Receiver<bool>,
    ) -> AdapterResult<Prediction> {
        let started = Instant::now();
        let mut faults = 0u32;

        loop {
            if *cancel_rx.borrow() {
                return Err(AdapterError::Cancelled);
            }
            if started.elapsed() >= deadline {
                return Err(AdapterError::DeadlineExceeded(deadline.as_secs()));
            }

            match self.get_status(prediction_id).await {
                Ok(prediction) => {
                    faults = 0;
                    match prediction.status {
                        PredictionStatus::Succeeded => return Ok(prediction),
                        PredictionStatus::Failed => {
                            return Err(AdapterError::PredictionFailed(
                                prediction
                                    .error
                                    .unwrap_or_else(|| "no error detail".to_string()),
                            ))
                        }
                        _ => {}
                    }
                }
                Err(e) if e.is_retryable() && faults < MAX_POLL_FAULTS => {
                    faults += 1;
                    warn!(
                        endpoint = %self.config.name,
                        prediction_id,
                        faults,
                        "Transient poll failure: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Download a produced artifact.
    pub async fn download(&self, url: &str) -> AdapterResult<Vec<u8>> {
        let response = self
            .download_http
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_http_status(status, body, None));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn acquire(&self) -> AdapterResult<tokio::sync::OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdapterError::Transient("endpoint semaphore closed".to_string()))
    }

    async fn parse_envelope(&self, response: reqwest::Response) -> AdapterResult<Prediction> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(AdapterError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(2000),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_http_status(status.as_u16(), body, None));
        }

        let envelope: PredictionEnvelope = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;
        Ok(envelope.normalize())
    }
}

fn classify_reqwest(e: reqwest::Error) -> AdapterError {
    if e.is_timeout() || e.is_connect() {
        AdapterError::Transient(e.to_string())
    } else if e.is_decode() {
        AdapterError::Malformed(e.to_string())
    } else {
        AdapterError::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(
            PredictionStatus::from_wire("queued"),
            PredictionStatus::Starting
        );
        assert_eq!(
            PredictionStatus::from_wire("running"),
            PredictionStatus::Processing
        );
        assert_eq!(
            PredictionStatus::from_wire("succeeded"),
            PredictionStatus::Succeeded
        );
        assert_eq!(
            PredictionStatus::from_wire("canceled"),
            PredictionStatus::Failed
        );
        assert!(PredictionStatus::Succeeded.is_terminal());
        assert!(!PredictionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_output_url_extraction() {
        assert_eq!(
            extract_output_url(&serde_json::json!("https://x/clip.mp4")),
            Some("https://x/clip.mp4".to_string())
        );
        assert_eq!(
            extract_output_url(&serde_json::json!(["https://x/a.mp4", "https://x/b.mp4"])),
            Some("https://x/a.mp4".to_string())
        );
        assert_eq!(
            extract_output_url(&serde_json::json!({"url": "https://x/a.mp3"})),
            Some("https://x/a.mp3".to_string())
        );
        assert_eq!(extract_output_url(&serde_json::json!(42)), None);
    }
}
