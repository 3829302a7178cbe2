// =============================================================================
// utils/retry.rs
// =============================================================================
// Helper: call_gateway_with_retry - timeout + exponential backoff + full jitter
// Usage: wrap outbound gateway calls to get robust retries on transient errors.
// =============================================================================

use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::error::OracleError;

/// Default per-attempt deadline (ms)
pub const GATEWAY_TIMEOUT_MS: u64 = 30_000;
/// Max attempts including first
pub const GATEWAY_MAX_RETRIES: usize = 3;
/// Base backoff (ms)
const BACKOFF_BASE_MS: u64 = 200;
/// Maximum backoff cap (ms)
const BACKOFF_MAX_MS: u64 = 5_000;

/// Call async closure `op` with standardized retry/backoff logic.
///
/// Only retryable failures (transient, rate-limited) are retried; invalid
/// input and not-found surface immediately.
pub async fn call_gateway_with_retry<F, Fut, T>(op: F) -> Result<T, OracleError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, OracleError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match timeout(Duration::from_millis(GATEWAY_TIMEOUT_MS), op()).await {
            Ok(res) => res,
            Err(_) => Err(OracleError::transient(format!(
                "gateway call timed out after {}ms",
                GATEWAY_TIMEOUT_MS
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < GATEWAY_MAX_RETRIES => {
                let backoff_ms = calculate_backoff_with_jitter(attempt);
                tracing::debug!(
                    "gateway call failed (attempt {}/{}): {}. Retrying in {}ms...",
                    attempt,
                    GATEWAY_MAX_RETRIES,
                    e,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Calculate exponential backoff with full jitter.
///
/// Formula: random(0, min(BACKOFF_MAX_MS, BACKOFF_BASE_MS * 2^(attempt-1)))
fn calculate_backoff_with_jitter(attempt: usize) -> u64 {
    let mut rng = rand::thread_rng();

    let exp_backoff =
        BACKOFF_BASE_MS.saturating_mul(2_u64.saturating_pow((attempt.saturating_sub(1)) as u32));
    let capped_backoff = exp_backoff.min(BACKOFF_MAX_MS);

    rng.gen_range(0..=capped_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_calculation() {
        let backoff1 = calculate_backoff_with_jitter(1);
        let backoff2 = calculate_backoff_with_jitter(2);

        assert!(backoff1 <= BACKOFF_BASE_MS);
        assert!(backoff2 <= BACKOFF_BASE_MS * 2);

        let backoff_large = calculate_backoff_with_jitter(20);
        assert!(backoff_large <= BACKOFF_MAX_MS);
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let result = call_gateway_with_retry(|| async { Ok::<_, OracleError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<i32, _> = call_gateway_with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OracleError::invalid_argument("bad token")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_on_transient() {
        let calls = AtomicUsize::new(0);
        let result: Result<i32, _> = call_gateway_with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OracleError::transient("gateway 503")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), GATEWAY_MAX_RETRIES);
    }
}
