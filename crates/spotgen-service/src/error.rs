//! Service-level error types.
//!
//! These are the errors the (out-of-scope) HTTP layer maps onto status
//! codes; everything the core can tell a caller is here.

use thiserror::Error;

use spotgen_models::JobId;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Monthly quota exhausted ({used} of {monthly_quota} used)")]
    QuotaExceeded { used: u32, monthly_quota: u32 },

    #[error("Already submitted as job {job_id}")]
    AlreadySubmitted { job_id: JobId },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store error: {0}")]
    Store(#[from] spotgen_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] spotgen_queue::QueueError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
