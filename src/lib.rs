//! Breakwater - Provider resilience and failover for LLM backends
//!
//! This library decides at call time which backend LLM provider should
//! service a request, protects callers from cascading failures with
//! per-provider circuit breakers, and retries transiently-failing calls
//! with configurable backoff.

pub mod breaker;
pub mod chain;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod retry;
pub mod telemetry;

pub use breaker::{BreakerStats, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use chain::{HandlerOutcome, ProviderChain, ProviderRequest, SkipReason};
pub use config::{BackoffStrategy, CircuitBreakerConfig, Environment, RetryConfig, Settings};
pub use context::{ProviderContext, ProviderStatsReport};
pub use error::{ProviderError, ProviderResult};
pub use provider::{
    ExclusionSet, InvokeParams, ProviderClient, ProviderConfig, ProviderName, ProviderRegistry,
};
pub use retry::RetryStrategy;
