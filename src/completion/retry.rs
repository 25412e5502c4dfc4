//! Bounded exponential backoff around any [`CompletionClient`].

use super::{CompletionClient, CompletionError};
use async_trait::async_trait;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// How many times to attempt a call and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` total attempts (at least one).
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts permitted, including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), doubling each time and capped at 30s.
    pub fn backoff(&self, retry: usize) -> Duration {
        let exponent = u32::try_from(retry.saturating_sub(1))
            .unwrap_or(MAX_BACKOFF_EXPONENT)
            .min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(MAX_BACKOFF)
    }
}

/// Completion client that retries transient failures of an inner client.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C> CompletionClient for RetryingClient<C>
where
    C: CompletionClient,
{
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(system, user).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_transient() && attempt < self.policy.max_attempts() => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient completion failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::debug!(attempt, error = %error, "Completion failed without retry");
                    return Err(error);
                }
            }
        }
    }
}
