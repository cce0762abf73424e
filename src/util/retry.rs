//! Capped exponential backoff for transient persistence errors, grounded on
//! the teacher's `v2/util/retry.rs` (`50 * 2^attempt` ms with jitter, capped
//! at 5s) (§7 "PersistenceError ... retried with backoff").

use crate::error::PipelineError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const BASE_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 5_000;

/// Retry `f` up to `attempts` times while it returns a transient
/// [`PipelineError`], backing off `50 * 2^attempt` ms plus jitter between
/// tries.
pub async fn retry_transient<F, Fut, T>(attempts: u32, mut f: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut last_err = None;
    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < attempts => {
                let delay = backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop runs at least once when attempts > 0"))
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    let capped = base.min(MAX_DELAY_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(5, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(PipelineError::persistence("not yet"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PipelineError> = retry_transient(5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::validation("bad input"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_attempts_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PipelineError> = retry_transient(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::persistence("still failing"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
