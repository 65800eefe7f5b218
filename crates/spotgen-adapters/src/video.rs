//! Video model adapter.

use spotgen_models::AspectRatio;

use crate::error::AdapterResult;
use crate::prediction::{Prediction, PredictionClient};

/// Façade over the scene-clip generation endpoint.
#[derive(Clone)]
pub struct VideoAdapter {
    client: PredictionClient,
}

impl VideoAdapter {
    pub fn new(client: PredictionClient) -> Self {
        Self { client }
    }

    /// Submit one scene for generation.
    ///
    /// `start_image_url` must be fetchable by the remote model (a presigned
    /// URL for chained scenes); absent for an unconstrained opener.
    pub async fn submit_scene(
        &self,
        generation_prompt: &str,
        duration_secs: u32,
        aspect_ratio: AspectRatio,
        start_image_url: Option<&str>,
    ) -> AdapterResult<Prediction> {
        let mut input = serde_json::json!({
            "prompt": generation_prompt,
            "duration": duration_secs,
            "aspect_ratio": aspect_ratio.as_str(),
        });
        if let Some(url) = start_image_url {
            input["start_image"] = serde_json::Value::String(url.to_string());
        }
        self.client.submit(input).await
    }

    /// The underlying prediction client, for polling and download.
    pub fn client(&self) -> &PredictionClient {
        &self.client
    }
}
