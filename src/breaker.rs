//! Circuit breakers for provider protection
//!
//! One breaker per provider isolates a failing backend: after
//! `failure_threshold` consecutive failures the breaker opens and callers
//! fail fast until `timeout` elapses, at which point a bounded number of
//! half-open trial calls probe for recovery.
//!
//! State transitions:
//! ```text
//! Closed → Open:      failure_count >= failure_threshold
//! Open → HalfOpen:    timeout elapsed since last failure
//! HalfOpen → Closed:  a trial call succeeds
//! HalfOpen → Open:    a trial call fails, or the trial budget is spent
//! ```
//!
//! The trial budget is charged at admission time: once `half_open_attempts`
//! trials have been admitted in one half-open window, further calls flip
//! the breaker back to open without waiting for the in-flight trials to
//! finish. One window is one probe budget, not a rolling allowance.

use crate::config::CircuitBreakerConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::metrics::Metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Diagnostic snapshot of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Seconds until an open breaker admits a probe; None unless open.
    pub retry_in_seconds: Option<f64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_used: u32,
}

/// Per-provider failure-isolation state machine
///
/// The internal lock guards only admission and bookkeeping; the wrapped
/// operation itself runs with the lock released, so a slow provider call
/// never stalls admission decisions for other callers.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Option<Arc<Metrics>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(name, config, None)
    }

    pub fn with_metrics(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_used: 0,
            }),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` through the breaker.
    ///
    /// Admission is decided under the lock; the operation runs unlocked;
    /// the outcome is recorded under the lock again. The underlying error
    /// is always re-raised unchanged; the breaker only gates admission.
    pub async fn call<T, F, Fut>(&self, operation: F) -> ProviderResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.admit().await?;

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success().await,
            Err(err) => self.record_failure(err).await,
        }

        result
    }

    async fn admit(&self) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                // A success recorded while open clears last_failure; treat
                // that as cooled down and admit the probe.
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.config.timeout());

                if elapsed >= self.config.timeout() {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    // This admission consumes the first trial of the window.
                    inner.half_open_used = 1;
                    tracing::info!(
                        breaker = %self.name,
                        "Circuit breaker half-open, admitting trial call"
                    );
                    Ok(())
                } else {
                    let retry_in = self.config.timeout() - elapsed;
                    tracing::debug!(
                        breaker = %self.name,
                        retry_in_seconds = retry_in.as_secs_f64(),
                        "Circuit breaker open, call rejected"
                    );
                    Err(ProviderError::CircuitOpen {
                        name: self.name.clone(),
                        retry_in_seconds: retry_in.as_secs_f64(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_used < self.config.half_open_attempts() {
                    inner.half_open_used += 1;
                    Ok(())
                } else {
                    // Trial budget spent for this window; back to open.
                    self.transition(&mut inner, CircuitState::Open);
                    inner.last_failure = Some(Instant::now());
                    inner.half_open_used = 0;
                    tracing::warn!(
                        breaker = %self.name,
                        "Half-open trial budget exhausted, circuit breaker re-opened"
                    );
                    Err(ProviderError::CircuitOpen {
                        name: self.name.clone(),
                        retry_in_seconds: self.config.timeout().as_secs_f64(),
                    })
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
            tracing::info!(breaker = %self.name, "Circuit breaker recovered to closed");
        }
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.half_open_used = 0;
    }

    async fn record_failure(&self, err: &ProviderError) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold() {
                    self.transition(&mut inner, CircuitState::Open);
                    tracing::warn!(
                        breaker = %self.name,
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold(),
                        error = %err,
                        "Failure threshold reached, circuit breaker opened"
                    );
                } else {
                    tracing::debug!(
                        breaker = %self.name,
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold(),
                        "Failure recorded, circuit breaker still closed"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
                inner.half_open_used = 0;
                tracing::warn!(
                    breaker = %self.name,
                    error = %err,
                    "Trial call failed, circuit breaker re-opened"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        if let Some(metrics) = &self.metrics {
            metrics.record_breaker_transition(&self.name, to);
        }
    }

    /// Administrative override: force the breaker closed and clear counters.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.half_open_used = 0;
        tracing::info!(breaker = %self.name, "Circuit breaker reset to closed");
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock().await;
        let retry_in_seconds = match inner.state {
            CircuitState::Open => inner.last_failure.map(|t| {
                (self.config.timeout().saturating_sub(t.elapsed())).as_secs_f64()
            }),
            _ => None,
        };
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            retry_in_seconds,
        }
    }
}

/// Thread-safe lazy registry of named circuit breakers
///
/// Breakers are created on first lookup with the registry's default config
/// and live for the process lifetime.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self::with_metrics(default_config, None)
    }

    pub fn with_metrics(
        default_config: CircuitBreakerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            metrics,
        }
    }

    /// Look up the breaker for `name`, creating it with the default config
    /// on first use.
    pub async fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(name, None).await
    }

    /// Like [`breaker`](Self::breaker) but with a config override applied
    /// if this call is the one that creates the breaker.
    pub async fn breaker_with(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().await;
            if let Some(existing) = breakers.get(name) {
                return existing.clone();
            }
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_metrics(
                    name,
                    config.unwrap_or_else(|| self.default_config.clone()),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }

    /// Snapshot stats for every known breaker.
    ///
    /// The map lock is held only to clone the handles; stat collection
    /// happens outside it.
    pub async fn all_stats(&self) -> Vec<BreakerStats> {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();

        let mut stats = Vec::with_capacity(handles.len());
        for breaker in handles {
            stats.push(breaker.stats().await);
        }
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Force every breaker closed.
    pub async fn reset_all(&self) {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();

        for breaker in handles {
            breaker.reset().await;
        }
    }
}
