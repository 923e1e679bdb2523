//! Bounded retry for transient store errors
//!
//! Only [`StoreError::Transient`] is retried, and always by re-running the
//! same conditional operation. Business outcomes (insufficient stock, a
//! conditional update that matched nothing) are results, not errors, and
//! never reach this loop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::store::{StoreError, StoreResult};

/// Max backoff between attempts
const BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &'static str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    let mut backoff = policy.base_delay;
    loop {
        match op().await {
            Err(StoreError::Transient(msg)) if attempt < policy.max_attempts => {
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..10));
                let delay = backoff.min(BACKOFF_MAX) + jitter;
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(fast(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Transient("deadlock".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: StoreResult<()> = with_retry(fast(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Transient("lock timeout".into()))
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backend_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: StoreResult<()> = with_retry(fast(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("syntax".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
