//! Command-line interface for Breakwater
//!
//! Provides argument parsing and subcommand handling for the diagnostics
//! binary.

use clap::{Parser, Subcommand};

/// Provider resilience and failover for LLM backends
#[derive(Parser)]
#[command(name = "breakwater")]
#[command(version)]
#[command(about = "Provider resilience and failover for LLM backends")]
#[command(
    long_about = "Breakwater discovers configured LLM providers from the environment, \
    guards each one with a circuit breaker, and selects a working provider at call time. \
    This binary inspects that state: discovered providers, health, and breaker status."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show discovered providers and circuit breaker state
    Providers,
    /// Invalidate the health cache for a provider and re-probe it
    Probe {
        /// Provider name (e.g. ollama)
        name: String,
    },
    /// Print the environment variable reference
    Env,
}

/// Environment variable reference printed by `breakwater env`
pub fn environment_reference() -> &'static str {
    r#"# Breakwater Environment Variables
# =================================

# ─── Providers ───────────────────────────────────────────────────────────
# Per provider {NAME} in {GROQ, OPENAI, DEEPSEEK, ANTHROPIC, OLLAMA, ...}:
#
#   {NAME}_API_KEY     API key (required for all providers except ollama)
#   {NAME}_API_BASE    Base URL (defaults exist for the known providers)
#   {NAME}_MODEL       Model identifier (defaults exist except for ollama)
#
# Any other FOO_API_KEY configures a custom OpenAI-compatible provider;
# custom providers also need FOO_MODEL (and usually FOO_API_BASE).

# ─── Selection & health ──────────────────────────────────────────────────
#   PROVIDER_PRIORITY_ORDER          Comma list, first tried first
#                                    (default: groq,openai,deepseek,anthropic,ollama)
#   PROVIDER_HEALTH_CHECK_ENABLED    Filter unhealthy providers (default: true)
#   PROVIDER_HEALTH_CHECK_TIMEOUT    Probe timeout in seconds (default: 2)
#   HEALTH_CHECK_CACHE_TTL           Probe cache TTL in seconds (default: 30)

# ─── Circuit breaker ─────────────────────────────────────────────────────
#   CIRCUIT_BREAKER_THRESHOLD            Failures before opening (default: 5)
#   CIRCUIT_BREAKER_TIMEOUT              Seconds open before probing (default: 60)
#   CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS   Trial calls per half-open window (default: 1)

# ─── Retry ───────────────────────────────────────────────────────────────
#   RETRY_MAX_ATTEMPTS       Attempts per operation (default: 3)
#   RETRY_BASE_DELAY         First backoff delay in seconds (default: 1.0)
#   RETRY_MAX_DELAY          Delay clamp in seconds (default: 10.0)
#   RETRY_BACKOFF_STRATEGY   exponential | linear | fixed (default: exponential)
#   RETRY_JITTER_ENABLED     Randomize delays by ±20% (default: true)
"#
}
