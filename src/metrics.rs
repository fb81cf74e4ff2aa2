//! Prometheus metrics for provider selection and resilience
//!
//! Tracks provider selections, handler skips, health probe outcomes, and
//! circuit breaker transitions. The label sets are deliberately small: the
//! provider label is bounded by the discovered provider set, and reason /
//! state labels come from closed enums.

use crate::breaker::CircuitState;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector for the provider subsystem
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    selections_total: IntCounterVec,
    handler_skips_total: IntCounterVec,
    health_checks_total: IntCounterVec,
    breaker_transitions_total: IntCounterVec,
}

impl Metrics {
    /// Create a collector backed by a fresh Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let selections_total = IntCounterVec::new(
            Opts::new(
                "provider_selections_total",
                "Successful provider selections by provider",
            ),
            &["provider"],
        )?;
        registry.register(Box::new(selections_total.clone()))?;

        let handler_skips_total = IntCounterVec::new(
            Opts::new(
                "provider_handler_skips_total",
                "Handler skips by handler and reason",
            ),
            &["handler", "reason"],
        )?;
        registry.register(Box::new(handler_skips_total.clone()))?;

        let health_checks_total = IntCounterVec::new(
            Opts::new(
                "provider_health_checks_total",
                "Health probe outcomes by provider and result",
            ),
            &["provider", "result"],
        )?;
        registry.register(Box::new(health_checks_total.clone()))?;

        let breaker_transitions_total = IntCounterVec::new(
            Opts::new(
                "circuit_breaker_transitions_total",
                "Circuit breaker state transitions by breaker and new state",
            ),
            &["breaker", "state"],
        )?;
        registry.register(Box::new(breaker_transitions_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            selections_total,
            handler_skips_total,
            health_checks_total,
            breaker_transitions_total,
        })
    }

    pub fn record_selection(&self, provider: &str) {
        self.selections_total.with_label_values(&[provider]).inc();
    }

    pub fn record_skip(&self, handler: &str, reason: &str) {
        self.handler_skips_total
            .with_label_values(&[handler, reason])
            .inc();
    }

    pub fn record_health_check(&self, provider: &str, healthy: bool) {
        let result = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks_total
            .with_label_values(&[provider, result])
            .inc();
    }

    pub fn record_breaker_transition(&self, breaker: &str, state: CircuitState) {
        self.breaker_transitions_total
            .with_label_values(&[breaker, state.as_str()])
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation_succeeds() {
        let metrics = Metrics::new().expect("metrics should register");
        // No samples recorded yet; gather still renders without error.
        let output = metrics.gather();
        assert!(!output.contains("provider_selections_total{"));
    }

    #[test]
    fn test_selection_counter_increments() {
        let metrics = Metrics::new().expect("metrics should register");
        metrics.record_selection("groq");
        metrics.record_selection("groq");
        metrics.record_selection("openai");

        let output = metrics.gather();
        assert!(output.contains(r#"provider_selections_total{provider="groq"} 2"#));
        assert!(output.contains(r#"provider_selections_total{provider="openai"} 1"#));
    }

    #[test]
    fn test_skip_counter_uses_handler_and_reason() {
        let metrics = Metrics::new().expect("metrics should register");
        metrics.record_skip("anthropic", "circuit_open");

        let output = metrics.gather();
        assert!(output.contains("provider_handler_skips_total"));
        assert!(output.contains(r#"handler="anthropic""#));
        assert!(output.contains(r#"reason="circuit_open""#));
    }

    #[test]
    fn test_health_check_counter() {
        let metrics = Metrics::new().expect("metrics should register");
        metrics.record_health_check("ollama", true);
        metrics.record_health_check("ollama", false);

        let output = metrics.gather();
        assert!(output.contains(r#"result="healthy""#));
        assert!(output.contains(r#"result="unhealthy""#));
    }

    #[test]
    fn test_breaker_transition_counter() {
        let metrics = Metrics::new().expect("metrics should register");
        metrics.record_breaker_transition("provider_groq", CircuitState::Open);

        let output = metrics.gather();
        assert!(output.contains("circuit_breaker_transitions_total"));
        assert!(output.contains(r#"state="open""#));
    }
}
