//! Provider selection chain
//!
//! An ordered walk over provider handlers. Each handler either resolves a
//! ready-to-use client or reports why it was skipped; a single provider's
//! failure never aborts the walk. Only full exhaustion produces a terminal
//! error, and that error distinguishes "nothing is configured" from
//! "everything configured is currently failing".

use crate::breaker::CircuitBreakerRegistry;
use crate::config::Settings;
use crate::error::{ProviderError, ProviderResult};
use crate::metrics::Metrics;
use crate::provider::client::{InvokeParams, ProviderClient};
use crate::provider::registry::ProviderRegistry;
use crate::provider::{ExclusionSet, KNOWN_PROVIDERS, ProviderConfig, ProviderName};
use crate::retry::RetryStrategy;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Why a handler declined to produce a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    Excluded,
    Unhealthy,
    CircuitOpen,
    ConstructionFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotConfigured => "not_configured",
            SkipReason::Excluded => "excluded",
            SkipReason::Unhealthy => "unhealthy",
            SkipReason::CircuitOpen => "circuit_open",
            SkipReason::ConstructionFailed => "construction_failed",
        }
    }
}

/// Tagged handler result: a resolved client, or a reasoned skip.
///
/// Skips are ordinary data, not errors; the chain logs them and moves on.
pub enum HandlerOutcome {
    Resolved(Box<ProviderClient>),
    Skip { reason: SkipReason, detail: String },
}

impl HandlerOutcome {
    fn skip(reason: SkipReason, detail: impl Into<String>) -> Self {
        HandlerOutcome::Skip {
            reason,
            detail: detail.into(),
        }
    }
}

/// Per-call selection request
///
/// Created fresh for every `get_client` invocation; the request id ties a
/// selection's log lines together.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    exclude: ExclusionSet,
    params: InvokeParams,
    request_id: Uuid,
}

impl ProviderRequest {
    pub fn new(exclude: ExclusionSet, params: InvokeParams) -> Self {
        Self {
            exclude,
            params,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn exclude(&self) -> &ExclusionSet {
        &self.exclude
    }

    pub fn params(&self) -> &InvokeParams {
        &self.params
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Shared collaborators handlers need to build clients
pub(crate) struct ChainServices {
    registry: Arc<ProviderRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    settings: Arc<Settings>,
    metrics: Option<Arc<Metrics>>,
    http: reqwest::Client,
}

impl ChainServices {
    /// Guarded client construction: the breaker for this provider admits
    /// (or rejects) the attempt, and records its outcome.
    async fn build_guarded_client(
        &self,
        request: &ProviderRequest,
        config: ProviderConfig,
    ) -> HandlerOutcome {
        let provider = config.name().clone();
        let breaker = self.breakers.breaker(&provider.breaker_key()).await;

        let constructed = breaker
            .call(|| async {
                ProviderClient::connect(
                    config,
                    request.params().clone(),
                    self.http.clone(),
                    RetryStrategy::new(self.settings.retry().clone()),
                    breaker.clone(),
                )
            })
            .await;

        match constructed {
            Ok(client) => HandlerOutcome::Resolved(Box::new(client)),
            Err(err @ ProviderError::CircuitOpen { .. }) => {
                tracing::debug!(
                    provider = %provider,
                    request_id = %request.request_id(),
                    error = %err,
                    "Circuit breaker rejected provider"
                );
                HandlerOutcome::skip(SkipReason::CircuitOpen, err.to_string())
            }
            Err(err) => {
                tracing::warn!(
                    provider = %provider,
                    request_id = %request.request_id(),
                    error = %err,
                    "Client construction failed"
                );
                HandlerOutcome::skip(SkipReason::ConstructionFailed, err.to_string())
            }
        }
    }
}

/// One link in the selection chain
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    /// Name used in logs and metrics for this handler.
    fn handler_name(&self) -> &str;

    /// Quick eligibility check; a false here is reported as a skip without
    /// touching health checks or breakers.
    async fn can_handle(&self, request: &ProviderRequest) -> bool;

    /// Attempt to produce a client.
    async fn handle(&self, request: &ProviderRequest) -> HandlerOutcome;
}

/// Handler for one of the first-class providers
pub struct NamedProviderHandler {
    provider: ProviderName,
    services: Arc<ChainServices>,
}

#[async_trait]
impl ProviderHandler for NamedProviderHandler {
    fn handler_name(&self) -> &str {
        self.provider.as_str()
    }

    async fn can_handle(&self, request: &ProviderRequest) -> bool {
        !request.exclude().contains(&self.provider)
            && self
                .services
                .registry
                .provider(&self.provider)
                .await
                .is_some()
    }

    async fn handle(&self, request: &ProviderRequest) -> HandlerOutcome {
        if request.exclude().contains(&self.provider) {
            return HandlerOutcome::skip(SkipReason::Excluded, "excluded by caller");
        }

        let Some(config) = self.services.registry.provider(&self.provider).await else {
            return HandlerOutcome::skip(SkipReason::NotConfigured, "provider not configured");
        };

        if self.services.settings.health_check_enabled() {
            let status = self.services.registry.provider_health(&config).await;
            if !status.is_usable() {
                return HandlerOutcome::skip(
                    SkipReason::Unhealthy,
                    format!("health probe reports {}", status.as_str()),
                );
            }
        }

        self.services.build_guarded_client(request, config).await
    }
}

/// Catch-all handler for configured providers without a named handler
///
/// Walks the registry's availability list (already health-filtered and
/// priority-sorted) and tries generic OpenAI-compatible construction for
/// every custom provider in turn.
pub struct CustomProviderHandler {
    services: Arc<ChainServices>,
}

#[async_trait]
impl ProviderHandler for CustomProviderHandler {
    fn handler_name(&self) -> &str {
        "custom"
    }

    async fn can_handle(&self, request: &ProviderRequest) -> bool {
        self.services
            .registry
            .available_providers(request.exclude())
            .await
            .iter()
            .any(|c| !c.name().is_known())
    }

    async fn handle(&self, request: &ProviderRequest) -> HandlerOutcome {
        let candidates: Vec<ProviderConfig> = self
            .services
            .registry
            .available_providers(request.exclude())
            .await
            .into_iter()
            .filter(|c| !c.name().is_known())
            .collect();

        if candidates.is_empty() {
            return HandlerOutcome::skip(
                SkipReason::NotConfigured,
                "no custom providers configured",
            );
        }

        let mut last_detail = String::new();
        for config in candidates {
            let provider = config.name().clone();
            match self.services.build_guarded_client(request, config).await {
                HandlerOutcome::Resolved(client) => return HandlerOutcome::Resolved(client),
                HandlerOutcome::Skip { reason, detail } => {
                    tracing::debug!(
                        provider = %provider,
                        request_id = %request.request_id(),
                        reason = reason.as_str(),
                        detail = %detail,
                        "Custom provider skipped"
                    );
                    last_detail = format!("{}: {}", provider, detail);
                }
            }
        }

        HandlerOutcome::skip(SkipReason::ConstructionFailed, last_detail)
    }
}

/// Ordered provider selection
///
/// Named handlers follow the configured priority order (known providers
/// missing from a partial override are appended after the listed ones);
/// the custom-provider catch-all always runs last.
pub struct ProviderChain {
    handlers: Vec<Box<dyn ProviderHandler>>,
    services: Arc<ChainServices>,
}

impl ProviderChain {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<ProviderRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let services = Arc::new(ChainServices {
            registry,
            breakers,
            settings: settings.clone(),
            metrics,
            http: reqwest::Client::new(),
        });

        let mut order: Vec<ProviderName> = settings
            .priority_order()
            .iter()
            .map(|n| ProviderName::from(n.as_str()))
            .filter(ProviderName::is_known)
            .collect();
        for name in KNOWN_PROVIDERS {
            let provider = ProviderName::from(name);
            if !order.contains(&provider) {
                order.push(provider);
            }
        }

        let mut handlers: Vec<Box<dyn ProviderHandler>> = order
            .into_iter()
            .map(|provider| {
                Box::new(NamedProviderHandler {
                    provider,
                    services: services.clone(),
                }) as Box<dyn ProviderHandler>
            })
            .collect();
        handlers.push(Box::new(CustomProviderHandler {
            services: services.clone(),
        }));

        Self { handlers, services }
    }

    /// Walk the chain and return the first successfully constructed client.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NoneConfigured`] when discovery found nothing at
    /// all; [`ProviderError::AllUnavailable`] when providers exist but
    /// every handler skipped.
    pub async fn get_client(
        &self,
        exclude: ExclusionSet,
        params: InvokeParams,
    ) -> ProviderResult<ProviderClient> {
        self.services.registry.discover().await;

        let request = ProviderRequest::new(exclude, params);
        tracing::debug!(
            request_id = %request.request_id(),
            excluded = request.exclude().len(),
            "Provider selection started"
        );

        for handler in &self.handlers {
            if !handler.can_handle(&request).await {
                tracing::trace!(
                    handler = handler.handler_name(),
                    request_id = %request.request_id(),
                    "Handler not applicable"
                );
                continue;
            }

            match handler.handle(&request).await {
                HandlerOutcome::Resolved(client) => {
                    tracing::info!(
                        provider = %client.provider_name(),
                        model = client.model(),
                        request_id = %request.request_id(),
                        "Provider selected"
                    );
                    if let Some(metrics) = &self.services.metrics {
                        metrics.record_selection(client.provider_name().as_str());
                    }
                    return Ok(*client);
                }
                HandlerOutcome::Skip { reason, detail } => {
                    tracing::debug!(
                        handler = handler.handler_name(),
                        request_id = %request.request_id(),
                        reason = reason.as_str(),
                        detail = %detail,
                        "Handler skipped"
                    );
                    if let Some(metrics) = &self.services.metrics {
                        metrics.record_skip(handler.handler_name(), reason.as_str());
                    }
                }
            }
        }

        self.exhausted(&request).await
    }

    /// Build the terminal error once every handler has declined.
    async fn exhausted(&self, request: &ProviderRequest) -> ProviderResult<ProviderClient> {
        let configured = self.services.registry.configured_names().await;
        if configured.is_empty() {
            tracing::error!(
                request_id = %request.request_id(),
                "Provider chain exhausted: no providers configured"
            );
            return Err(ProviderError::NoneConfigured);
        }

        let attempted: Vec<String> = configured
            .iter()
            .filter(|name| !request.exclude().contains(name))
            .map(|name| name.to_string())
            .collect();
        let providers = if attempted.is_empty() {
            // Everything configured was excluded by the caller.
            configured
                .iter()
                .map(|name| format!("{} (excluded)", name))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            attempted.join(", ")
        };

        tracing::error!(
            request_id = %request.request_id(),
            providers = %providers,
            "Provider chain exhausted: all configured providers unavailable"
        );
        Err(ProviderError::AllUnavailable { providers })
    }
}
