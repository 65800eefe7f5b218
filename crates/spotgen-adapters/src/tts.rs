//! Text-to-speech adapter for narration and disclaimers.

use crate::error::AdapterResult;
use crate::prediction::{Prediction, PredictionClient};

/// Default narrator voice.
pub const DEFAULT_VOICE: &str = "narrator_warm_f";

/// Façade over the TTS endpoint.
#[derive(Clone)]
pub struct TtsAdapter {
    client: PredictionClient,
}

impl TtsAdapter {
    pub fn new(client: PredictionClient) -> Self {
        Self { client }
    }

    /// Submit speech synthesis.
    ///
    /// `speed` is a playback-rate multiplier; disclaimers run at 1.4x.
    pub async fn submit_speech(
        &self,
        text: &str,
        voice: &str,
        speed: f64,
    ) -> AdapterResult<Prediction> {
        let input = serde_json::json!({
            "text": text,
            "voice": voice,
            "speed": speed,
        });
        self.client.submit(input).await
    }

    pub fn client(&self) -> &PredictionClient {
        &self.client
    }
}
