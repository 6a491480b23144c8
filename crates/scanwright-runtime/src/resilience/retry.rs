//! Transport retries for judge calls.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

use crate::judges::JudgeError;

/// Exponential backoff for transient judge failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, min_delay: Duration) -> Self {
        Self {
            max_retries,
            min_delay,
            max_delay: min_delay * 16,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// Run `op`, retrying only errors for which [`JudgeError::is_retryable`] holds.
pub async fn with_transport_retries<T, F, Fut>(
    policy: &RetryPolicy,
    judge: &str,
    op: F,
) -> Result<T, JudgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JudgeError>>,
{
    op.retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(JudgeError::is_retryable)
        .notify(|error: &JudgeError, delay: Duration| {
            tracing::warn!(judge, error = %error, delay = ?delay, "Transient judge failure, retrying");
        })
        .await
}
