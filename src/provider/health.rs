//! Health probing for provider endpoints
//!
//! Probes never propagate errors: any failure degrades to "unhealthy" and
//! the provider is filtered out of selection until a later probe succeeds.
//! Providers without a checker report [`HealthStatus::Unknown`] and remain
//! usable.

use crate::provider::ProviderConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Health judgment for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// No probe capability exists for this provider.
    Unknown,
}

impl HealthStatus {
    /// Whether selection should consider the provider at all.
    /// Unknown counts as usable: absence of evidence is not failure.
    pub fn is_usable(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl From<bool> for HealthStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Liveness probe for one provider family
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Whether this checker knows how to probe the given provider.
    fn supports(&self, config: &ProviderConfig) -> bool;

    /// Probe the provider. Returns a plain boolean; probe failures are
    /// logged, never raised.
    async fn probe(&self, config: &ProviderConfig) -> bool;
}

/// Ollama liveness probe: `GET {api_base}/api/tags`, 200 means healthy
pub struct OllamaHealthChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaHealthChecker {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HealthChecker for OllamaHealthChecker {
    fn supports(&self, config: &ProviderConfig) -> bool {
        config.name().as_str() == "ollama"
    }

    async fn probe(&self, config: &ProviderConfig) -> bool {
        let url = format!("{}/api/tags", config.api_base().trim_end_matches('/'));

        match self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => {
                let healthy = response.status() == reqwest::StatusCode::OK;
                tracing::debug!(
                    provider = %config.name(),
                    url = %url,
                    status = %response.status(),
                    healthy,
                    "Health probe completed"
                );
                healthy
            }
            Err(e) => {
                tracing::debug!(
                    provider = %config.name(),
                    url = %url,
                    error = %e,
                    "Health probe failed"
                );
                false
            }
        }
    }
}
