//! Worker error types and job-level classification.

use thiserror::Error;

use spotgen_adapters::AdapterError;
use spotgen_models::{JobErrorKind, ScriptError, Stage};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Script validation failed: {0}")]
    Script(#[from] ScriptError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Store error: {0}")]
    Firestore(#[from] spotgen_firestore::FirestoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] spotgen_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] spotgen_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] spotgen_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene {scene} failed: {message}")]
    SceneFailed { scene: u32, message: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Conditional write lost the race; result dropped")]
    StaleWrite,

    #[error("Job not found: {0}")]
    JobMissing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn scene_failed(scene: u32, message: impl Into<String>) -> Self {
        Self::SceneFailed {
            scene,
            message: message.into(),
        }
    }

    /// Transient failures are absorbed by bounded in-stage retry.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Adapter(e) => e.is_retryable(),
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Storage(e) => matches!(
                e,
                spotgen_storage::StorageError::UploadFailed(_)
                    | spotgen_storage::StorageError::DownloadFailed(_)
            ),
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            WorkerError::Adapter(e) => e.retry_after_ms(),
            WorkerError::Firestore(e) => e.retry_after_ms(),
            _ => None,
        }
    }

    /// Scene number to annotate the job error with, if any.
    pub fn scene(&self) -> Option<u32> {
        match self {
            WorkerError::SceneFailed { scene, .. } => Some(*scene),
            _ => None,
        }
    }

    /// Map a surfaced (post-retry) failure to the job-level error kind.
    pub fn classify(&self, stage: Stage) -> JobErrorKind {
        match self {
            WorkerError::Cancelled
            | WorkerError::Adapter(AdapterError::Cancelled)
            | WorkerError::Media(spotgen_media::MediaError::Cancelled) => JobErrorKind::Cancelled,

            WorkerError::Timeout(_)
            | WorkerError::Adapter(AdapterError::DeadlineExceeded(_))
            | WorkerError::Media(spotgen_media::MediaError::Timeout(_)) => JobErrorKind::Timeout,

            WorkerError::Script(_) => JobErrorKind::PlannerMalformed,

            WorkerError::SceneFailed { .. } => JobErrorKind::ClipGenerationFailed,

            WorkerError::Adapter(AdapterError::Malformed(_)) => match stage {
                Stage::Planning | Stage::DisclaimerPlanning => JobErrorKind::PlannerMalformed,
                _ => JobErrorKind::AdapterBadRequest,
            },

            WorkerError::Adapter(AdapterError::BadRequest(_))
            | WorkerError::Adapter(AdapterError::Auth(_)) => JobErrorKind::AdapterBadRequest,

            WorkerError::Adapter(AdapterError::RateLimited { .. }) => {
                JobErrorKind::AdapterRateLimited
            }

            WorkerError::Adapter(AdapterError::Transient(_)) => JobErrorKind::AdapterTransient,

            WorkerError::Adapter(AdapterError::PredictionFailed(_)) => match stage {
                Stage::ClipGeneration => JobErrorKind::ClipGenerationFailed,
                Stage::NarrationSynthesis => JobErrorKind::TtsFailed,
                Stage::Composition => JobErrorKind::CompositionFailed,
                _ => JobErrorKind::AdapterBadRequest,
            },

            WorkerError::Media(_) => JobErrorKind::CompositionFailed,

            _ => JobErrorKind::AdapterTransient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(WorkerError::Adapter(AdapterError::Transient("x".into())).is_transient());
        assert!(
            WorkerError::Adapter(AdapterError::RateLimited { retry_after_ms: 1 }).is_transient()
        );
        assert!(!WorkerError::Adapter(AdapterError::BadRequest("x".into())).is_transient());
        assert!(!WorkerError::Cancelled.is_transient());
    }

    #[test]
    fn test_malformed_maps_by_stage() {
        let err = WorkerError::Adapter(AdapterError::Malformed("bad json".into()));
        assert_eq!(err.classify(Stage::Planning), JobErrorKind::PlannerMalformed);
        assert_eq!(
            err.classify(Stage::ClipGeneration),
            JobErrorKind::AdapterBadRequest
        );
    }

    #[test]
    fn test_prediction_failure_maps_by_stage() {
        let err = WorkerError::Adapter(AdapterError::PredictionFailed("boom".into()));
        assert_eq!(
            err.classify(Stage::ClipGeneration),
            JobErrorKind::ClipGenerationFailed
        );
        assert_eq!(
            err.classify(Stage::NarrationSynthesis),
            JobErrorKind::TtsFailed
        );
        assert_eq!(
            err.classify(Stage::Composition),
            JobErrorKind::CompositionFailed
        );
    }

    #[test]
    fn test_scene_annotation() {
        let err = WorkerError::scene_failed(3, "prediction failed twice");
        assert_eq!(err.scene(), Some(3));
        assert_eq!(
            err.classify(Stage::ClipGeneration),
            JobErrorKind::ClipGenerationFailed
        );
    }
}
