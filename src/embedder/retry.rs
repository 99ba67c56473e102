//! Bounded exponential backoff around any embedder.

use super::Embedder;
use crate::error::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Retry policy for transient embedding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-indexed): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Delay after a failed attempt. A server `Retry-After` hint can lengthen
    /// the backoff but never past `max_backoff_ms`.
    pub fn delay_for(&self, attempt: u32, err: &EmbedError) -> Duration {
        let backoff = self.backoff(attempt);
        match err {
            EmbedError::RateLimited {
                retry_after: Some(hint),
            } => backoff
                .max(*hint)
                .min(Duration::from_millis(self.max_backoff_ms)),
            _ => backoff,
        }
    }
}

/// Retries retryable failures of the inner embedder.
pub struct RetryingEmbedder<E> {
    inner: E,
    config: RetryConfig,
}

impl<E: Embedder> RetryingEmbedder<E> {
    pub fn new(inner: E, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.embed(text, model_id).await {
                Ok(v) => return Ok(v),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt, &err);
                    warn!(
                        embedder = self.inner.name(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying embedding call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with `error`.
    struct Flaky {
        failures: u32,
        error: EmbedError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Embedder for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn embed(&self, _text: &str, _model_id: &str) -> Result<Vec<f32>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(vec![1.0])
            }
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(500));
        assert_eq!(config.backoff(2), Duration::from_millis(1000));
        assert_eq!(config.backoff(3), Duration::from_millis(2000));
        assert_eq!(config.backoff(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let config = RetryConfig::default();
        let huge = EmbedError::RateLimited {
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert_eq!(config.delay_for(1, &huge), Duration::from_millis(8_000));

        let short = EmbedError::RateLimited {
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(config.delay_for(2, &short), Duration::from_millis(1000));

        let moderate = EmbedError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(config.delay_for(1, &moderate), Duration::from_secs(3));

        let transport = EmbedError::Transport("reset".into());
        assert_eq!(config.delay_for(3, &transport), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_long_retry_after_does_not_stall() {
        let flaky = Flaky {
            failures: 1,
            error: EmbedError::RateLimited {
                retry_after: Some(Duration::from_secs(3600)),
            },
            calls: AtomicU32::new(0),
        };
        let embedder = RetryingEmbedder::new(flaky, fast());
        let result = tokio::time::timeout(Duration::from_secs(5), embedder.embed("x", "m")).await;
        assert_eq!(result.unwrap().unwrap(), vec![1.0]);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let flaky = Flaky {
            failures: 2,
            error: EmbedError::RateLimited { retry_after: None },
            calls: AtomicU32::new(0),
        };
        let embedder = RetryingEmbedder::new(flaky, fast());
        assert_eq!(embedder.embed("x", "m").await.unwrap(), vec![1.0]);
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Flaky {
            failures: 10,
            error: EmbedError::Transport("reset".into()),
            calls: AtomicU32::new(0),
        };
        let embedder = RetryingEmbedder::new(flaky, fast());
        assert!(embedder.embed("x", "m").await.is_err());
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_input_too_large() {
        let flaky = Flaky {
            failures: 10,
            error: EmbedError::InputTooLarge { chars: 9 },
            calls: AtomicU32::new(0),
        };
        let embedder = RetryingEmbedder::new(flaky, fast());
        let err = embedder.embed("x", "m").await.unwrap_err();
        assert_eq!(err, EmbedError::InputTooLarge { chars: 9 });
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 1);
    }
}
