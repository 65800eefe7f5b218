//! Bounded retry with exponential backoff and jitter for stage work.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// Initial backoff delay.
const BASE_DELAY: Duration = Duration::from_secs(2);

/// Backoff multiplier per attempt.
const BACKOFF_FACTOR: u32 = 2;

/// Jitter applied around each delay, as a fraction.
const JITTER_FRACTION: f64 = 0.20;

/// Attempt budget for the light stages (planning, music, TTS).
pub const LIGHT_STAGE_ATTEMPTS: u32 = 3;

/// Attempt budget for the heavy stages (per-scene clips, composition).
pub const HEAVY_STAGE_ATTEMPTS: u32 = 2;

/// Backoff delay for an attempt (0-based), with +/-20% jitter.
///
/// A server-provided Retry-After hint overrides the computed delay.
pub fn backoff_delay(attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(ms) = retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms = BASE_DELAY.as_millis() as u64 * u64::from(BACKOFF_FACTOR.pow(attempt));

    // Deterministic sub-millisecond entropy is enough for jitter here
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let unit = (nanos % 1000) as f64 / 1000.0; // [0, 1)
    let factor = 1.0 + JITTER_FRACTION * (2.0 * unit - 1.0); // [0.8, 1.2)

    Duration::from_millis((base_ms as f64 * factor) as u64)
}

/// Run an operation, retrying transient failures up to `max_attempts`
/// total attempts. Permanent failures surface immediately.
pub async fn run_with_retries<T, F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    op: F,
) -> WorkerResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = WorkerResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(attempt, e.retry_after_ms());
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Giving up after retries: {}",
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgen_adapters::AdapterError;

    #[test]
    fn test_backoff_grows_with_jitter_bounds() {
        for attempt in 0..3 {
            let expected = 2000u64 * 2u64.pow(attempt);
            let delay = backoff_delay(attempt, None).as_millis() as u64;
            let low = (expected as f64 * 0.79) as u64;
            let high = (expected as f64 * 1.21) as u64;
            assert!(
                (low..=high).contains(&delay),
                "attempt {attempt}: {delay} outside [{low}, {high}]"
            );
        }
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        assert_eq!(backoff_delay(5, Some(1234)), Duration::from_millis(1234));
    }

    #[tokio::test]
    async fn test_permanent_errors_surface_immediately() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: WorkerResult<()> = run_with_retries("test", 3, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(WorkerError::Adapter(AdapterError::BadRequest("no".into()))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retry_to_budget() {
        tokio::time::pause();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let fut = run_with_retries("test", 3, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(WorkerError::Adapter(AdapterError::Transient("down".into()))) }
        });
        let result = fut.await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_eventual_success() {
        tokio::time::pause();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = run_with_retries("test", 3, || {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(WorkerError::Adapter(AdapterError::Transient("blip".into())))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
