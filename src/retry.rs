use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Bounded-attempt retry with exponential backoff.
///
/// One policy instance is shared by every retryable external call (embedding,
/// content fetch) so backoff behavior is uniform instead of being re-derived
/// inline at each call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Run `op` up to `max_attempts` times, sleeping `base_delay * 2^attempt`
    /// between failures. Returns the last error when all attempts fail.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!("{what} attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                    if attempt + 1 < self.max_attempts {
                        let delay = self.base_delay * 2u32.saturating_pow(attempt as u32);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let policy = RetryPolicy::new(2, 1);
        let calls = AtomicUsize::new(0);
        let result: Result<i32> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let policy = RetryPolicy::new(3, 1);
        let calls = AtomicUsize::new(0);
        let result: Result<&str> = policy
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("transient")
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let policy = RetryPolicy::new(2, 1);
        let calls = AtomicUsize::new(0);
        let result: Result<()> = policy
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("always fails") }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result.unwrap_err().to_string().contains("always fails"));
    }

    #[tokio::test]
    async fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, 1);
        assert_eq!(policy.max_attempts, 1);
    }
}
