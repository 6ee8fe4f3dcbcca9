//! Transient-failure retry decorator.
//!
//! `RetryingBackend` wraps any [`GeneratorBackend`] and retries transient
//! failures (timeouts, rate limits, outages, transport errors) with
//! exponential backoff, up to a fixed retry budget. The budget is a
//! run-level setting, independent of any worker's self-refinement bound:
//! it protects one backend call, not one stage attempt.
//!
//! The wrapper also enforces the invocation's call timeout: the inner
//! future is dropped when the deadline passes, so a hung call cannot
//! outlive its budgeted slot, and the elapsed attempt is classified as a
//! transient timeout.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crewforge_utils::error::GeneratorError;

use crate::types::{GeneratorBackend, GeneratorInvocation, GeneratorResult};

/// Retry settings for transient backend failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retries after the initial call.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each subsequent retry.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    fn backoff_for(&self, retry: u32) -> Duration {
        // Cap the shift so pathological budgets cannot overflow.
        let exponent = (retry.saturating_sub(1)).min(10);
        self.base_backoff * 2u32.pow(exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Decorator adding timeout enforcement and transient-failure retries to
/// any generator backend.
pub struct RetryingBackend {
    inner: Box<dyn GeneratorBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    /// Wrap `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: Box<dyn GeneratorBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl GeneratorBackend for RetryingBackend {
    async fn invoke(&self, inv: GeneratorInvocation) -> Result<GeneratorResult, GeneratorError> {
        let mut retries = 0u32;

        loop {
            let attempt = tokio::time::timeout(inv.timeout, self.inner.invoke(inv.clone())).await;

            let error = match attempt {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_elapsed) => GeneratorError::Timeout {
                    duration: inv.timeout,
                },
            };

            if !error.is_transient() || retries >= self.policy.max_retries {
                return Err(error);
            }

            retries += 1;
            let backoff = self.policy.backoff_for(retries);
            warn!(
                stage = %inv.stage,
                retry = retries,
                max_retries = self.policy.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "transient generator failure, will retry"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
