//! Provider discovery and availability
//!
//! Discovery runs at most once per registry: it scans the environment
//! snapshot for the known providers plus any custom `*_API_KEY`, keeps the
//! configs that pass `is_configured()`, and assigns priorities from the
//! configured order. Health results are cached with a TTL so concurrent
//! callers share probes instead of hammering the backends.

use crate::config::{Environment, Settings};
use crate::metrics::Metrics;
use crate::provider::health::{HealthChecker, HealthStatus, OllamaHealthChecker};
use crate::provider::{ExclusionSet, KNOWN_PROVIDERS, ProviderConfig, ProviderName};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    healthy: bool,
    checked_at: Instant,
}

/// Diagnostic snapshot of one discovered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatsEntry {
    pub name: ProviderName,
    pub configured: bool,
    pub priority: u32,
    pub model: String,
    pub api_base: String,
    /// Cached health judgment; expired or missing cache entries report
    /// `unknown` rather than triggering a probe.
    pub health: HealthStatus,
}

/// Discovers and tracks configured providers
pub struct ProviderRegistry {
    settings: Arc<Settings>,
    env: Environment,
    providers: RwLock<HashMap<ProviderName, ProviderConfig>>,
    discovered: Mutex<bool>,
    health_cache: RwLock<HashMap<ProviderName, HealthEntry>>,
    health_checkers: Vec<Arc<dyn HealthChecker>>,
    metrics: Option<Arc<Metrics>>,
}

impl ProviderRegistry {
    pub fn new(settings: Arc<Settings>, env: Environment) -> Self {
        Self::with_metrics(settings, env, None)
    }

    pub fn with_metrics(
        settings: Arc<Settings>,
        env: Environment,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let http = reqwest::Client::new();
        let health_checkers: Vec<Arc<dyn HealthChecker>> = vec![Arc::new(
            OllamaHealthChecker::new(http, settings.health_check_timeout()),
        )];

        Self {
            settings,
            env,
            providers: RwLock::new(HashMap::new()),
            discovered: Mutex::new(false),
            health_cache: RwLock::new(HashMap::new()),
            health_checkers,
            metrics,
        }
    }

    /// Discover provider configurations from the environment snapshot.
    ///
    /// Idempotent: the first call populates the provider map, every later
    /// call is a no-op. Returns the number of configured providers.
    pub async fn discover(&self) -> usize {
        let mut discovered = self.discovered.lock().await;
        if *discovered {
            return self.providers.read().await.len();
        }

        let mut found: HashMap<ProviderName, ProviderConfig> = HashMap::new();

        for name in KNOWN_PROVIDERS {
            let provider = ProviderName::from(name);
            let config = ProviderConfig::from_environment(
                &provider,
                &self.env,
                self.settings.priority_for(name),
            );
            if config.is_configured() {
                tracing::info!(
                    provider = %provider,
                    model = config.model(),
                    priority = config.priority(),
                    "Discovered provider"
                );
                found.insert(provider, config);
            } else {
                tracing::debug!(provider = %provider, "Provider not configured, skipping");
            }
        }

        // Custom providers: any FOO_API_KEY that is not one of the known set.
        for key in self.env.keys_with_suffix("_API_KEY") {
            let prefix = key.trim_end_matches("_API_KEY");
            if prefix.is_empty() {
                continue;
            }
            let provider = ProviderName::from(prefix);
            if provider.is_known() || found.contains_key(&provider) {
                continue;
            }
            let config = ProviderConfig::from_environment(
                &provider,
                &self.env,
                self.settings.priority_for(provider.as_str()),
            );
            if config.is_configured() {
                tracing::info!(
                    provider = %provider,
                    model = config.model(),
                    priority = config.priority(),
                    "Discovered custom provider"
                );
                found.insert(provider, config);
            } else {
                tracing::warn!(
                    provider = %provider,
                    "Custom provider has an API key but is missing {}_MODEL, skipping",
                    prefix
                );
            }
        }

        let count = found.len();
        *self.providers.write().await = found;
        *discovered = true;

        tracing::info!(providers = count, "Provider discovery complete");
        count
    }

    /// Fetch one provider's config, if it was discovered.
    pub async fn provider(&self, name: &ProviderName) -> Option<ProviderConfig> {
        self.providers.read().await.get(name).cloned()
    }

    /// Names of every configured provider, priority order.
    pub async fn configured_names(&self) -> Vec<ProviderName> {
        let providers = self.providers.read().await;
        let mut configs: Vec<&ProviderConfig> = providers.values().collect();
        configs.sort_by(|a, b| (a.priority(), a.name()).cmp(&(b.priority(), b.name())));
        configs.iter().map(|c| c.name().clone()).collect()
    }

    /// Configured, non-excluded providers that pass the health filter,
    /// sorted ascending by priority (name breaks ties for determinism).
    pub async fn available_providers(&self, exclude: &ExclusionSet) -> Vec<ProviderConfig> {
        let candidates: Vec<ProviderConfig> = {
            let providers = self.providers.read().await;
            providers
                .values()
                .filter(|c| !exclude.contains(c.name()))
                .cloned()
                .collect()
        };

        // Probe candidates concurrently; the cache keeps redundant probes
        // off the wire within the TTL window.
        let checks = candidates.into_iter().map(|config| async move {
            if self.settings.health_check_enabled() {
                let status = self.provider_health(&config).await;
                if !status.is_usable() {
                    tracing::debug!(
                        provider = %config.name(),
                        "Provider filtered out as unhealthy"
                    );
                    return None;
                }
            }
            Some(config)
        });
        let mut available: Vec<ProviderConfig> = futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();

        available.sort_by(|a, b| (a.priority(), a.name()).cmp(&(b.priority(), b.name())));
        available
    }

    /// Health judgment for a provider, consulting the TTL cache first.
    ///
    /// A cache entry older than the TTL is treated as absent and triggers
    /// a fresh probe. Providers without a checker are `Unknown`.
    pub async fn provider_health(&self, config: &ProviderConfig) -> HealthStatus {
        let Some(checker) = self.checker_for(config) else {
            return HealthStatus::Unknown;
        };

        if let Some(entry) = self.health_cache.read().await.get(config.name()) {
            if entry.checked_at.elapsed() < self.settings.health_cache_ttl() {
                return entry.healthy.into();
            }
        }

        self.probe_and_cache(checker.as_ref(), config).await
    }

    /// Drop the cached judgment for `name` and re-probe synchronously.
    ///
    /// Returns `Unknown` when the provider is not configured or has no
    /// probe capability.
    pub async fn force_health_check(&self, name: &ProviderName) -> HealthStatus {
        let Some(config) = self.provider(name).await else {
            return HealthStatus::Unknown;
        };
        let Some(checker) = self.checker_for(&config) else {
            return HealthStatus::Unknown;
        };

        self.health_cache.write().await.remove(name);
        tracing::debug!(provider = %name, "Health cache invalidated, re-probing");
        self.probe_and_cache(checker.as_ref(), &config).await
    }

    async fn probe_and_cache(
        &self,
        checker: &dyn HealthChecker,
        config: &ProviderConfig,
    ) -> HealthStatus {
        let healthy = checker.probe(config).await;

        self.health_cache.write().await.insert(
            config.name().clone(),
            HealthEntry {
                healthy,
                checked_at: Instant::now(),
            },
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(config.name().as_str(), healthy);
        }
        if !healthy {
            tracing::warn!(provider = %config.name(), "Provider probed unhealthy");
        }

        healthy.into()
    }

    fn checker_for(&self, config: &ProviderConfig) -> Option<Arc<dyn HealthChecker>> {
        self.health_checkers
            .iter()
            .find(|c| c.supports(config))
            .cloned()
    }

    /// Diagnostic snapshot of every discovered provider. Reads the health
    /// cache without probing, so it is cheap to call.
    pub async fn provider_stats(&self) -> Vec<ProviderStatsEntry> {
        let providers: Vec<ProviderConfig> =
            self.providers.read().await.values().cloned().collect();
        let cache = self.health_cache.read().await;

        let mut stats: Vec<ProviderStatsEntry> = providers
            .into_iter()
            .map(|config| {
                let health = match cache.get(config.name()) {
                    Some(entry)
                        if entry.checked_at.elapsed() < self.settings.health_cache_ttl() =>
                    {
                        entry.healthy.into()
                    }
                    _ => HealthStatus::Unknown,
                };
                ProviderStatsEntry {
                    name: config.name().clone(),
                    configured: true,
                    priority: config.priority(),
                    model: config.model().to_string(),
                    api_base: config.api_base().to_string(),
                    health,
                }
            })
            .collect();

        stats.sort_by(|a, b| (a.priority, a.name.clone()).cmp(&(b.priority, b.name.clone())));
        stats
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
