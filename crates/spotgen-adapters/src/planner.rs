//! Script planner LLM client.
//!
//! Unlike the generation endpoints, the planner is a single-shot
//! `generateContent`-style call: no prediction id, no polling. The caller
//! owns prompt construction; this client owns transport, model fallback,
//! and error classification.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::prediction::CALL_TIMEOUT;

/// Default model fallback chain, strongest-first.
const DEFAULT_MODELS: &[&str] = &["planner-pro", "planner-flash", "planner-flash-lite"];

/// Planner endpoint configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub base_url: String,
    pub api_key: String,
    /// Models tried in order until one answers
    pub models: Vec<String>,
}

impl PlannerConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Client for the planner LLM endpoint.
#[derive(Clone)]
pub struct PlannerClient {
    config: PlannerConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

impl PlannerClient {
    pub fn new(config: PlannerConfig) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Generate a JSON-mode response, walking the model fallback chain.
    pub async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> AdapterResult<String> {
        let mut last_error = None;

        for model in &self.config.models {
            match self
                .call_model(model, system_prompt, user_prompt, temperature)
                .await
            {
                Ok(text) => {
                    info!(model, "Planner responded");
                    return Ok(text);
                }
                // A malformed payload from one model is worth trying the
                // next model for; a bad request is not.
                Err(e @ AdapterError::BadRequest(_)) | Err(e @ AdapterError::Auth(_)) => {
                    return Err(e)
                }
                Err(e) => {
                    warn!(model, "Planner model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AdapterError::Transient("no planner models configured".to_string())))
    }

    async fn call_model(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> AdapterResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: user_prompt.to_string(),
                }],
            }],
            system_instruction: Some(Content {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_http_status(
                status.as_u16(),
                body,
                retry_after_ms,
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;

        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| AdapterError::Malformed("no content in planner response".to_string()))
    }
}
