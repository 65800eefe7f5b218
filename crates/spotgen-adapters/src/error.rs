//! Adapter error types.

use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced by the external-model façades.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// 4xx from the endpoint: the request itself is wrong, retrying the
    /// same input cannot help.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 429 with the server's retry hint.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Timeout, 5xx, or network failure.
    #[error("Transient endpoint failure: {0}")]
    Transient(String),

    /// The endpoint answered but the payload does not parse.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The prediction itself reported `failed`.
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// Missing or rejected credentials.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Cancellation observed while waiting.
    #[error("Cancelled while waiting on the endpoint")]
    Cancelled,

    /// The per-stage deadline elapsed while polling.
    #[error("Deadline elapsed after {0} seconds")]
    DeadlineExceeded(u64),
}

impl AdapterError {
    /// Transient errors may be retried with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Transient(_) | AdapterError::RateLimited { .. }
        )
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            AdapterError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Classify an HTTP status code from a model endpoint.
    pub fn from_http_status(status: u16, body: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            401 | 403 => AdapterError::Auth(body),
            429 => AdapterError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(2000),
            },
            400..=499 => AdapterError::BadRequest(body),
            _ => AdapterError::Transient(format!("HTTP {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            AdapterError::from_http_status(400, "bad".into(), None),
            AdapterError::BadRequest(_)
        ));
        assert!(matches!(
            AdapterError::from_http_status(429, "slow".into(), Some(500)),
            AdapterError::RateLimited { retry_after_ms: 500 }
        ));
        assert!(matches!(
            AdapterError::from_http_status(503, "down".into(), None),
            AdapterError::Transient(_)
        ));
        assert!(matches!(
            AdapterError::from_http_status(401, "denied".into(), None),
            AdapterError::Auth(_)
        ));
    }

    #[test]
    fn test_retryability() {
        assert!(AdapterError::Transient("x".into()).is_retryable());
        assert!(AdapterError::RateLimited { retry_after_ms: 1 }.is_retryable());
        assert!(!AdapterError::BadRequest("x".into()).is_retryable());
        assert!(!AdapterError::Cancelled.is_retryable());
        assert!(!AdapterError::DeadlineExceeded(300).is_retryable());
    }
}
