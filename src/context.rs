//! Application context wiring
//!
//! [`ProviderContext`] is the single object an embedding application
//! constructs at startup and passes to whatever pipeline needs provider
//! clients. It owns the settings, registries, metrics, and chain; there
//! is no module-level global state anywhere in the crate.

use crate::breaker::{BreakerStats, CircuitBreakerRegistry};
use crate::chain::ProviderChain;
use crate::config::{Environment, Settings};
use crate::error::{ProviderError, ProviderResult};
use crate::metrics::Metrics;
use crate::provider::client::{InvokeParams, ProviderClient};
use crate::provider::health::HealthStatus;
use crate::provider::registry::{ProviderRegistry, ProviderStatsEntry};
use crate::provider::{ExclusionSet, ProviderName};
use serde::Serialize;
use std::sync::Arc;

/// Combined diagnostic snapshot: providers plus breakers
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatsReport {
    pub providers: Vec<ProviderStatsEntry>,
    pub breakers: Vec<BreakerStats>,
}

/// Process-wide provider subsystem state, constructed once at startup
pub struct ProviderContext {
    settings: Arc<Settings>,
    registry: Arc<ProviderRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<Metrics>,
    chain: ProviderChain,
}

impl ProviderContext {
    /// Build a context from the current process environment.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(Environment::capture())
    }

    /// Build a context from an explicit environment snapshot.
    pub fn new(env: Environment) -> ProviderResult<Self> {
        let settings = Arc::new(Settings::from_environment(&env)?);
        let metrics = Arc::new(
            Metrics::new().map_err(|e| {
                ProviderError::Internal(format!("failed to register metrics: {}", e))
            })?,
        );
        let registry = Arc::new(ProviderRegistry::with_metrics(
            settings.clone(),
            env,
            Some(metrics.clone()),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::with_metrics(
            settings.breaker().clone(),
            Some(metrics.clone()),
        ));
        let chain = ProviderChain::new(
            settings.clone(),
            registry.clone(),
            breakers.clone(),
            Some(metrics.clone()),
        );

        Ok(Self {
            settings,
            registry,
            breakers,
            metrics,
            chain,
        })
    }

    /// Run provider discovery now instead of lazily on the first
    /// `get_client` call. Idempotent.
    pub async fn discover(&self) -> usize {
        self.registry.discover().await
    }

    /// Select a provider and return a ready-to-use client handle.
    pub async fn get_client(
        &self,
        exclude: ExclusionSet,
        params: InvokeParams,
    ) -> ProviderResult<ProviderClient> {
        self.chain.get_client(exclude, params).await
    }

    /// Diagnostic snapshot of every provider and breaker.
    pub async fn get_provider_stats(&self) -> ProviderStatsReport {
        ProviderStatsReport {
            providers: self.registry.provider_stats().await,
            breakers: self.breakers.all_stats().await,
        }
    }

    /// Invalidate the cached judgment for one provider and re-probe.
    pub async fn force_health_check(&self, name: &ProviderName) -> HealthStatus {
        self.registry.force_health_check(name).await
    }

    /// Force every circuit breaker closed (administrative override).
    pub async fn reset_breakers(&self) {
        self.breakers.reset_all().await;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }
}
