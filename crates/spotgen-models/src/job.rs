//! The authoritative job record.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::disclaimer::DisclaimerSpec;
use crate::error::{JobError, JobErrorKind};
use crate::request::AdRequest;
use crate::script::Script;
use crate::stage::Stage;

/// Days a completed job record (and its derived assets) is retained.
pub const JOB_TTL_DAYS: i64 = 7;

/// Days a script-only record is retained.
pub const SCRIPT_TTL_DAYS: i64 = 30;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Coarse job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet picked up by a worker
    #[default]
    Pending,
    /// A worker is driving the job through the pipeline
    Processing,
    /// Final video produced
    Completed,
    /// Failed with a structured error
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable handle of the external prediction currently being polled.
///
/// Persisted before the first poll so a restarted worker resumes polling
/// the same prediction instead of re-submitting a paid request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InflightPrediction {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_number: Option<u32>,
    pub prediction_id: String,
}

/// A single video-generation request and its entire state history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub job_id: JobId,

    /// Owning user
    pub user_id: String,

    /// Coarse lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Fine-grained pipeline position
    #[serde(default)]
    pub stage: Stage,

    /// Frozen submission
    pub request: AdRequest,

    /// Planner output, set when planning completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,

    /// Ordered storage keys, one per completed scene clip
    #[serde(default)]
    pub clip_urls: Vec<String>,

    /// Storage key of the music bed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,

    /// Storage key of the narrator voiceover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_url: Option<String>,

    /// Storage key of the synthesized disclaimer audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer_audio_url: Option<String>,

    /// Disclaimer plan (pharma mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer_spec: Option<DisclaimerSpec>,

    /// Storage key of the composed final video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    /// Structured failure, populated only in `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Prediction being polled, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inflight: Option<InflightPrediction>,

    /// Cancellation intent; observed at every suspension point
    #[serde(default)]
    pub cancel_requested: bool,

    /// Queue delivery attempt count
    #[serde(default)]
    pub attempt: u32,

    /// Dedup key for duplicate submissions
    pub idempotency_key: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Expiry after which the record and derived assets may be reaped
    pub ttl: DateTime<Utc>,
}

impl Job {
    /// Create a new job in `processing/planning`, as persisted by Submit.
    pub fn new(user_id: impl Into<String>, request: AdRequest, idempotency_key: String) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            user_id: user_id.into(),
            status: JobStatus::Processing,
            stage: Stage::Planning,
            request,
            script: None,
            clip_urls: Vec::new(),
            music_url: None,
            narration_url: None,
            disclaimer_audio_url: None,
            disclaimer_spec: None,
            final_video_url: None,
            error: None,
            inflight: None,
            cancel_requested: false,
            attempt: 0,
            idempotency_key,
            created_at: now,
            updated_at: now,
            completed_at: None,
            ttl: now + Duration::days(JOB_TTL_DAYS),
        }
    }

    /// True when the submission carries regulated disclaimer text.
    pub fn pharma_mode(&self) -> bool {
        self.request.pharma_mode()
    }

    /// Number of scenes the planner committed to, once planned.
    pub fn planned_scene_count(&self) -> usize {
        self.script.as_ref().map(|s| s.scenes.len()).unwrap_or(0)
    }

    /// Whether a stage applies to this job. Skippable stages without a
    /// matching request advance their marker without running.
    pub fn stage_applies(&self, stage: Stage) -> bool {
        match stage {
            Stage::MusicGeneration => self
                .script
                .as_ref()
                .map(|s| !s.audio_spec.music_style.trim().is_empty())
                .unwrap_or(false),
            Stage::DisclaimerPlanning | Stage::NarrationSynthesis => self.pharma_mode(),
            _ => true,
        }
    }

    /// Mark the job completed with the final artifact.
    pub fn complete(&mut self, final_video_url: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.stage = Stage::Complete;
        self.final_video_url = Some(final_video_url.into());
        self.inflight = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the job failed with a structured error.
    pub fn fail(&mut self, kind: JobErrorKind, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(JobError::new(kind, self.stage, message));
        self.inflight = None;
        self.updated_at = Utc::now();
    }

    /// Mark the job cancelled.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.error = Some(JobError::new(
            JobErrorKind::Cancelled,
            self.stage,
            "cancelled by user",
        ));
        self.inflight = None;
        self.updated_at = Utc::now();
    }
}

/// Derive an idempotency key when the caller did not supply one.
///
/// Uses the stable parts of the submission so an identical resubmission
/// within the dedup window maps to the same job.
pub fn derive_idempotency_key(user_id: &str, request: &AdRequest) -> String {
    match &request.idempotency_key {
        Some(key) => format!("{user_id}:{key}"),
        None => {
            let mut fingerprint = format!(
                "{}:{}:{}",
                request.prompt, request.duration_secs, request.aspect_ratio
            );
            if let Some(img) = &request.start_image_url {
                fingerprint.push(':');
                fingerprint.push_str(img);
            }
            // Simple FNV-1a; collision risk is acceptable for a dedup hint
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in fingerprint.as_bytes() {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            format!("{user_id}:{hash:016x}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::AspectRatio;

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

    #[test]
    fn test_new_job_starts_in_planning() {
        let job = Job::new("user-1", request(), "user-1:abc".to_string());
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.stage, Stage::Planning);
        assert!(job.clip_urls.is_empty());
        assert!(job.ttl > job.created_at);
    }

    #[test]
    fn test_pharma_stages_skipped_without_disclaimer() {
        let job = Job::new("user-1", request(), "k".to_string());
        assert!(!job.stage_applies(Stage::DisclaimerPlanning));
        assert!(!job.stage_applies(Stage::NarrationSynthesis));
        assert!(job.stage_applies(Stage::ClipGeneration));
    }

    #[test]
    fn test_music_applies_once_planned() {
        let mut job = Job::new("user-1", request(), "k".to_string());
        assert!(!job.stage_applies(Stage::MusicGeneration));
        job.script = Some(crate::script::tests::script_with_durations(&[8, 8, 8, 8]));
        assert!(job.stage_applies(Stage::MusicGeneration));
    }

    #[test]
    fn test_fail_records_stage() {
        let mut job = Job::new("user-1", request(), "k".to_string());
        job.stage = Stage::ClipGeneration;
        job.fail(JobErrorKind::ClipGenerationFailed, "scene 3 failed");
        assert_eq!(job.status, JobStatus::Failed);
        let err = job.error.unwrap();
        assert_eq!(err.stage, Stage::ClipGeneration);
        assert_eq!(err.kind, JobErrorKind::ClipGenerationFailed);
    }

    #[test]
    fn test_complete_sets_terminal_fields() {
        let mut job = Job::new("user-1", request(), "k".to_string());
        job.complete("users/user-1/jobs/x/final/video.mp4");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.stage, Stage::Complete);
        assert!(job.final_video_url.is_some());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_derived_idempotency_key_is_stable() {
        let req = request();
        let a = derive_idempotency_key("user-1", &req);
        let b = derive_idempotency_key("user-1", &req);
        assert_eq!(a, b);
        assert!(a.starts_with("user-1:"));

        let mut other = request();
        other.duration_secs = 20;
        assert_ne!(a, derive_idempotency_key("user-1", &other));
    }

    #[test]
    fn test_caller_key_wins() {
        let mut req = request();
        req.idempotency_key = Some("my-key".to_string());
        assert_eq!(derive_idempotency_key("u", &req), "u:my-key");
    }
}
