use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::errors::SdkError;

/// Retries for idempotent reads (nonce, balance, receipt, token name). Calls that change state
/// on the backend or on chain never go through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        delay: Duration::ZERO,
    };

    /// Runs `operation` until it succeeds, fails with a non transient error, or the retry budget
    /// is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, operation: F) -> Result<T, SdkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SdkError>>,
    {
        let builder = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_retries);
        operation
            .retry(builder)
            .when(SdkError::is_transient)
            .notify(|err, after| {
                tracing::warn!(%err, ?after, "{what} failed, retrying");
            })
            .await
    }
}

/// YAML shape of [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub delay_ms: u64,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast(3)
            .run("reading nonce", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SdkError::dependency("reading nonce", "connection reset"))
                } else {
                    Ok(7u64)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_respected() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast(2)
            .run("reading balance", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SdkError::dependency("reading balance", "timeout"))
            })
            .await;

        assert_matches!(result, Err(SdkError::Dependency { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast(5)
            .run("reading receipt", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SdkError::Validation("bad hash".to_string()))
            })
            .await;

        assert_matches!(result, Err(SdkError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_conversion() {
        let policy = RetryPolicy::from(RetryConfig {
            max_retries: 4,
            delay_ms: 250,
        });
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
