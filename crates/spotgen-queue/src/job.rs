//! Queue job envelope.

use serde::{Deserialize, Serialize};

use spotgen_models::JobId;

/// A job delivered through the stream to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Drive one ad-generation job to a terminal state.
    GenerateAd(GenerateAdJob),
}

/// Payload for a `GenerateAd` delivery. The job record in the store is
/// authoritative; the queue only carries the pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAdJob {
    pub job_id: JobId,
    pub user_id: String,
    /// Dedup key mirrored from the job record
    pub idempotency_key: String,
}

impl QueueJob {
    /// The store-level job this delivery points at.
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::GenerateAd(j) => &j.job_id,
        }
    }

    /// Dedup key for enqueue-time idempotency.
    pub fn idempotency_key(&self) -> &str {
        match self {
            QueueJob::GenerateAd(j) => &j.idempotency_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let job = QueueJob::GenerateAd(GenerateAdJob {
            job_id: JobId::from_string("job-1"),
            user_id: "user-1".to_string(),
            idempotency_key: "user-1:abc".to_string(),
        });
        let payload = serde_json::to_string(&job).unwrap();
        assert!(payload.contains("\"type\":\"generate_ad\""));
        let back: QueueJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.job_id().as_str(), "job-1");
        assert_eq!(back.idempotency_key(), "user-1:abc");
    }
}
