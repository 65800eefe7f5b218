//! Uniform façades over the external model endpoints.
//!
//! Every generation endpoint (video, music, TTS) speaks the shared
//! prediction protocol: submit, poll, fetch artifact. The planner LLM is
//! the one single-shot exception. API keys load once at startup; each
//! endpoint gets its own concurrency semaphore because each has its own
//! rate budget.

pub mod error;
pub mod json_extract;
pub mod music;
pub mod planner;
pub mod prediction;
pub mod secrets;
pub mod tts;
pub mod video;

#[cfg(test)]
mod wire_tests;

pub use error::{AdapterError, AdapterResult};
pub use json_extract::{extract_and_parse, extract_json_object};
pub use music::{build_music_prompt, structure_tags, MusicAdapter};
pub use planner::{PlannerClient, PlannerConfig};
pub use prediction::{
    EndpointConfig, Prediction, PredictionClient, PredictionStatus, CALL_TIMEOUT,
    DOWNLOAD_TIMEOUT, POLL_INTERVAL,
};
pub use secrets::Secrets;
pub use tts::{TtsAdapter, DEFAULT_VOICE};
pub use video::VideoAdapter;
