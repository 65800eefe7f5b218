//! Shared processing context for stage workers.

use spotgen_adapters::{
    EndpointConfig, MusicAdapter, PlannerClient, PlannerConfig, PredictionClient, Secrets,
    TtsAdapter, VideoAdapter,
};
use spotgen_firestore::{FirestoreClient, JobsRepository, UsageRepository};
use spotgen_storage::AssetStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Everything a stage worker needs, constructed once per process.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub jobs: JobsRepository,
    pub usage: UsageRepository,
    pub storage: AssetStore,
    pub planner: PlannerClient,
    pub video: VideoAdapter,
    pub music: MusicAdapter,
    pub tts: TtsAdapter,
}

impl ProcessingContext {
    /// Build the context from the environment.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let firestore = FirestoreClient::from_env().await?;
        let jobs = JobsRepository::new(firestore.clone());
        let usage = UsageRepository::new(firestore);

        let storage = AssetStore::from_env().await?;

        let secrets = Secrets::from_env()?;

        let planner = PlannerClient::new(PlannerConfig::new(
            env_or("PLANNER_BASE_URL", "https://generativelanguage.googleapis.com"),
            secrets.planner_api_key.clone(),
        ))?;

        let video = VideoAdapter::new(PredictionClient::new(EndpointConfig {
            name: "video".to_string(),
            base_url: env_or("VIDEO_MODEL_BASE_URL", "https://api.replicate.com/v1"),
            api_key: secrets.video_api_key.clone(),
            model_version: require_env("VIDEO_MODEL_VERSION")?,
            max_concurrency: env_concurrency("VIDEO_MODEL_CONCURRENCY", 4),
        })?);

        let music = MusicAdapter::new(PredictionClient::new(EndpointConfig {
            name: "music".to_string(),
            base_url: env_or("MUSIC_MODEL_BASE_URL", "https://api.replicate.com/v1"),
            api_key: secrets.music_api_key.clone(),
            model_version: require_env("MUSIC_MODEL_VERSION")?,
            max_concurrency: env_concurrency("MUSIC_MODEL_CONCURRENCY", 2),
        })?);

        let tts = TtsAdapter::new(PredictionClient::new(EndpointConfig {
            name: "tts".to_string(),
            base_url: env_or("TTS_BASE_URL", "https://api.replicate.com/v1"),
            api_key: secrets.tts_api_key.clone(),
            model_version: require_env("TTS_MODEL_VERSION")?,
            max_concurrency: env_concurrency("TTS_CONCURRENCY", 2),
        })?);

        Ok(Self {
            config,
            jobs,
            usage,
            storage,
            planner,
            video,
            music,
            tts,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_env(name: &str) -> WorkerResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| WorkerError::config_error(format!("{name} not set")))
}

fn env_concurrency(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
