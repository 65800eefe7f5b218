//! Structured job error taxonomy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stage::Stage;

/// Mutually exclusive failure kinds surfaced on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Submission validation failed (client's fault)
    InvalidRequest,
    /// No monthly budget remaining
    QuotaExceeded,
    /// Duplicate idempotency key
    AlreadySubmitted,
    /// Planner returned unparseable or non-conforming JSON
    PlannerMalformed,
    /// 4xx from an external model endpoint
    AdapterBadRequest,
    /// Timeout, 5xx, or network failure talking to a model endpoint
    AdapterTransient,
    /// 429 from a model endpoint
    AdapterRateLimited,
    /// A specific scene could not be produced after retries
    ClipGenerationFailed,
    /// Disclaimer/narration synthesis failed in pharma mode
    TtsFailed,
    /// Media processing error during composition
    CompositionFailed,
    /// Stage or job deadline exceeded
    Timeout,
    /// Caller-initiated cancellation
    Cancelled,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::InvalidRequest => "invalid_request",
            JobErrorKind::QuotaExceeded => "quota_exceeded",
            JobErrorKind::AlreadySubmitted => "already_submitted",
            JobErrorKind::PlannerMalformed => "planner_malformed",
            JobErrorKind::AdapterBadRequest => "adapter_bad_request",
            JobErrorKind::AdapterTransient => "adapter_transient",
            JobErrorKind::AdapterRateLimited => "adapter_rate_limited",
            JobErrorKind::ClipGenerationFailed => "clip_generation_failed",
            JobErrorKind::TtsFailed => "tts_failed",
            JobErrorKind::CompositionFailed => "composition_failed",
            JobErrorKind::Timeout => "timeout",
            JobErrorKind::Cancelled => "cancelled",
        }
    }

    /// Transient kinds are absorbed by bounded retry inside a stage;
    /// everything else surfaces to the orchestrator as permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JobErrorKind::AdapterTransient | JobErrorKind::AdapterRateLimited
        )
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error record persisted on a failed job. The sole source of truth for
/// user-visible failure reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Failure classification
    pub kind: JobErrorKind,
    /// Stage the failure occurred in
    pub stage: Stage,
    /// Human-readable detail
    pub message: String,
    /// Failing scene number for clip failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<u32>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            scene: None,
        }
    }

    /// Annotate the error with the failing scene number.
    pub fn with_scene(mut self, scene: u32) -> Self {
        self.scene = Some(scene);
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scene {
            Some(scene) => write!(
                f,
                "{} at {} (scene {}): {}",
                self.kind, self.stage, scene, self.message
            ),
            None => write!(f, "{} at {}: {}", self.kind, self.stage, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(JobErrorKind::AdapterTransient.is_transient());
        assert!(JobErrorKind::AdapterRateLimited.is_transient());
        assert!(!JobErrorKind::AdapterBadRequest.is_transient());
        assert!(!JobErrorKind::PlannerMalformed.is_transient());
        assert!(!JobErrorKind::Timeout.is_transient());
        assert!(!JobErrorKind::Cancelled.is_transient());
    }

    #[test]
    fn test_scene_annotation() {
        let err = JobError::new(
            JobErrorKind::ClipGenerationFailed,
            Stage::ClipGeneration,
            "prediction failed twice",
        )
        .with_scene(3);
        assert_eq!(err.scene, Some(3));
        assert!(err.to_string().contains("scene 3"));
    }
}
