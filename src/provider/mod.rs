//! Provider identity and configuration
//!
//! A provider is one configured backend LLM API endpoint. Known providers
//! (groq, openai, deepseek, anthropic, ollama) carry default base URLs and
//! models; any other `{NAME}_API_KEY` in the environment yields a custom
//! provider speaking the OpenAI-compatible protocol.

pub mod client;
pub mod health;
pub mod registry;

pub use client::{InvokeParams, ProviderClient};
pub use health::{HealthChecker, HealthStatus, OllamaHealthChecker};
pub use registry::{ProviderRegistry, ProviderStatsEntry};

use crate::config::Environment;
use serde::Serialize;
use std::collections::HashSet;

/// Provider names recognized with first-class defaults.
pub const KNOWN_PROVIDERS: [&str; 5] = ["groq", "openai", "deepseek", "anthropic", "ollama"];

/// Type-safe wrapper for provider names
///
/// Prevents typos in exclusion sets and breaker keys. Names are stored
/// lowercased so `"OpenAI"` and `"openai"` refer to the same provider.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize)]
pub struct ProviderName(String);

impl ProviderName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Breaker key for this provider.
    pub fn breaker_key(&self) -> String {
        format!("provider_{}", self.0)
    }

    /// True for providers with first-class defaults and named handlers.
    pub fn is_known(&self) -> bool {
        KNOWN_PROVIDERS.contains(&self.0.as_str())
    }
}

impl From<&str> for ProviderName {
    fn from(name: &str) -> Self {
        Self(name.to_lowercase())
    }
}

impl From<String> for ProviderName {
    fn from(name: String) -> Self {
        Self(name.to_lowercase())
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type alias for exclusion sets passed to client selection
pub type ExclusionSet = HashSet<ProviderName>;

/// Wire protocol a client handle speaks to its provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientProtocol {
    /// `POST {base}/chat/completions` with a bearer token.
    OpenAiCompat,
    /// `POST {base}/v1/messages` with `x-api-key`.
    Anthropic,
    /// `POST {base}/api/chat`, no credentials.
    Ollama,
}

impl ClientProtocol {
    fn for_provider(name: &str) -> Self {
        match name {
            "anthropic" => ClientProtocol::Anthropic,
            "ollama" => ClientProtocol::Ollama,
            // groq, openai, deepseek, and every custom provider speak the
            // OpenAI-compatible shape.
            _ => ClientProtocol::OpenAiCompat,
        }
    }
}

/// Identity and connection data for one backend provider
///
/// Built once during discovery and immutable afterwards. Fields are private
/// so a config that passed `is_configured()` stays valid.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    name: ProviderName,
    api_key: String,
    api_base: String,
    model: String,
    priority: u32,
    protocol: ClientProtocol,
    /// Provider-level generation defaults, overridable per call.
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Assemble a config for `name` from an environment snapshot.
    ///
    /// Reads `{NAME}_API_KEY`, `{NAME}_API_BASE`, and `{NAME}_MODEL`,
    /// falling back to per-provider defaults where they exist. Returns the
    /// config whether or not it is fully configured; callers gate on
    /// [`is_configured`](Self::is_configured).
    pub fn from_environment(name: &ProviderName, env: &Environment, priority: u32) -> Self {
        let upper = name.as_str().to_uppercase();
        let api_key = env
            .get(&format!("{}_API_KEY", upper))
            .unwrap_or_default()
            .to_string();
        let api_base = env
            .get(&format!("{}_API_BASE", upper))
            .map(str::to_string)
            .or_else(|| default_api_base(name.as_str()).map(str::to_string))
            .unwrap_or_default();
        let model = env
            .get(&format!("{}_MODEL", upper))
            .map(str::to_string)
            .or_else(|| default_model(name.as_str()).map(str::to_string))
            .unwrap_or_default();
        let temperature = parse_optional(env, &format!("{}_TEMPERATURE", upper));
        let max_tokens = parse_optional(env, &format!("{}_MAX_TOKENS", upper));

        Self {
            name: name.clone(),
            api_key,
            api_base,
            model,
            priority,
            protocol: ClientProtocol::for_provider(name.as_str()),
            temperature,
            max_tokens,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        name: &str,
        api_key: &str,
        api_base: &str,
        model: &str,
        priority: u32,
    ) -> Self {
        Self {
            name: ProviderName::from(name),
            api_key: api_key.to_string(),
            api_base: api_base.to_string(),
            model: model.to_string(),
            priority,
            protocol: ClientProtocol::for_provider(name),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Whether this provider has enough configuration to construct a client.
    ///
    /// Every provider needs an API key and a model, except ollama, which
    /// runs unauthenticated and instead needs a base URL and a model.
    pub fn is_configured(&self) -> bool {
        if self.name.as_str() == "ollama" {
            !self.api_base.is_empty() && !self.model.is_empty()
        } else {
            !self.api_key.is_empty() && !self.model.is_empty()
        }
    }

    pub fn name(&self) -> &ProviderName {
        &self.name
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Selection priority; lower values are tried first.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn protocol(&self) -> ClientProtocol {
        self.protocol
    }

    /// Provider-level default temperature, if configured.
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Provider-level default max_tokens, if configured.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
}

/// Parse an optional numeric env var, warning (not failing) on bad values:
/// discovery must not abort over one malformed tuning knob.
fn parse_optional<T: std::str::FromStr>(env: &Environment, key: &str) -> Option<T> {
    let raw = env.get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring unparseable provider parameter");
            None
        }
    }
}

fn default_api_base(name: &str) -> Option<&'static str> {
    match name {
        "groq" => Some("https://api.groq.com/openai/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "anthropic" => Some("https://api.anthropic.com"),
        "ollama" => Some("http://localhost:11434"),
        _ => None,
    }
}

fn default_model(name: &str) -> Option<&'static str> {
    match name {
        "groq" => Some("llama-3.3-70b-versatile"),
        "openai" => Some("gpt-4o-mini"),
        "deepseek" => Some("deepseek-chat"),
        "anthropic" => Some("claude-3-5-haiku-latest"),
        // Ollama deployments vary too much for a useful default model.
        _ => None,
    }
}
