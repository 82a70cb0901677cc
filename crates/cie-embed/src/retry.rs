//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{EmbedError, Result};

/// Default maximum attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// Cap on any single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Transient errors back off exponentially with up to 25% random jitter; a
/// 429 with a `Retry-After` hint sleeps at least that long.
pub async fn with_retries<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = BASE_DELAY;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let mut sleep_for = delay;
                if let EmbedError::RateLimited {
                    retry_after: Some(secs),
                } = &err
                {
                    sleep_for = sleep_for.max(Duration::from_secs(*secs));
                }
                let jitter = rand::thread_rng().gen_range(0..=sleep_for.as_millis() as u64 / 4);
                let sleep_for = (sleep_for + Duration::from_millis(jitter)).min(MAX_DELAY);

                debug!(attempt, ?sleep_for, "transient embedding error, retrying: {err}");
                tokio::time::sleep(sleep_for).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => return Err(err),
        }
    }

    // max_attempts >= 1, so the loop always returns before falling through
    unreachable!("retry loop exited without a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries(4, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EmbedError::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries(4, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EmbedError::Auth("no".into())) }
        })
        .await;

        assert!(matches!(result, Err(EmbedError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EmbedError::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(EmbedError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
