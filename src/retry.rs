use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::IndexError;

const MAX_DELAY_MS: u64 = 60_000;

/// Exponential backoff for operations that fail with retryable
/// [`IndexError`]s. Other errors are returned on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryHandler {
    max_retries: u32,
    base_delay_ms: u64,
}

impl RetryHandler {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        assert!(max_retries > 0, "At least one attempt must be allowed");
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, IndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() || attempt >= self.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// `base * 2^(attempt-1)`, capped at one minute.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(MAX_DELAY_MS))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let handler = RetryHandler::new(5, 100);
        assert_eq!(handler.delay_for(1), Duration::from_millis(100));
        assert_eq!(handler.delay_for(2), Duration::from_millis(200));
        assert_eq!(handler.delay_for(4), Duration::from_millis(800));
        assert_eq!(handler.delay_for(40), Duration::from_millis(MAX_DELAY_MS));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let handler = RetryHandler::new(4, 1);
        let calls = AtomicU32::new(0);
        let result = handler
            .execute("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(IndexError::SourceUnavailable("timeout".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let handler = RetryHandler::new(3, 1);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = handler
            .execute("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IndexError::SourceUnavailable("refused".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let handler = RetryHandler::new(5, 1);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = handler
            .execute("config", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IndexError::InvalidConfig("bad".into()))
            })
            .await;
        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
