//! Retry execution with configurable backoff
//!
//! Runs an async operation up to `max_attempts` times, sleeping between
//! attempts. A result that arrives without an error but is unusable (an
//! empty completion, say) counts as a retryable failure; non-retryable
//! errors abort immediately and are re-raised unchanged.

use crate::config::{BackoffStrategy, RetryConfig};
use crate::error::{ProviderError, ProviderResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Usability check applied to successful results before they are accepted.
///
/// Mirrors the rule that a provider "succeeding" with an empty payload is
/// still a failure worth retrying.
pub trait Validity {
    fn is_usable(&self) -> bool;
}

impl Validity for String {
    fn is_usable(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Validity for serde_json::Value {
    fn is_usable(&self) -> bool {
        match self {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Object(map) => {
                if map.is_empty() {
                    return false;
                }
                // A payload carrying a `text` field is only usable if that
                // field has content.
                match map.get("text") {
                    Some(serde_json::Value::String(text)) => !text.trim().is_empty(),
                    Some(serde_json::Value::Null) => false,
                    Some(_) | None => true,
                }
            }
            _ => true,
        }
    }
}

impl<T: Validity> Validity for Option<T> {
    fn is_usable(&self) -> bool {
        self.as_ref().is_some_and(Validity::is_usable)
    }
}

/// Executes operations with bounded retries and backoff delays
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the retry that follows attempt `attempt` (0-indexed),
    /// clamped to the configured maximum. Jitter is applied separately in
    /// [`execute`](Self::execute) so this stays deterministic for tests.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay().as_secs_f64();
        let raw = match self.config.backoff() {
            // Saturate the exponent; 2^32 seconds is already beyond any
            // reasonable max_delay clamp.
            BackoffStrategy::Exponential => base * 2f64.powi(attempt.min(63) as i32),
            BackoffStrategy::Linear => base * f64::from(attempt + 1),
            BackoffStrategy::Fixed => base,
        };
        let clamped = raw.min(self.config.max_delay().as_secs_f64());
        Duration::from_secs_f64(clamped)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.config.jitter_enabled() {
            return delay;
        }
        let factor = rand::rng().random_range(0.8..=1.2);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }

    /// Run `operation` until it produces a usable result, a non-retryable
    /// error occurs, or the attempt budget is spent.
    ///
    /// On exhaustion the last observed error is re-raised; nothing is
    /// swallowed.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> ProviderResult<T>
    where
        T: Validity,
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut last_error = ProviderError::Internal("retry loop executed no attempts".to_string());

        for attempt in 0..max_attempts {
            match operation().await {
                Ok(result) if result.is_usable() => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            max_attempts,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Ok(_) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        "Operation returned an unusable result, treating as retryable failure"
                    );
                    last_error = ProviderError::InvalidResponse {
                        provider: "unknown".to_string(),
                        reason: "operation returned an empty or unusable result".to_string(),
                    };
                }
                Err(err) if !err.is_retryable() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %err,
                        "Non-retryable error, aborting retry loop"
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "Retryable failure recorded"
                    );
                    last_error = err;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.jittered(self.delay_for_attempt(attempt));
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Sleeping before next attempt"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(max_attempts, error = %last_error, "Retry attempts exhausted");
        Err(last_error)
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
