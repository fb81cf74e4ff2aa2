//! Provider client handles
//!
//! A [`ProviderClient`] is the opaque capability handed back to callers:
//! one `invoke(prompt) -> text` operation. Each invoke runs the provider's
//! wire protocol through the shared retry strategy, and the whole
//! retry-wrapped operation passes through the provider's circuit breaker,
//! so repeated invoke failures open the same breaker that guards selection.

use crate::breaker::CircuitBreaker;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ClientProtocol, ProviderConfig, ProviderName};
use crate::retry::RetryStrategy;
use serde_json::{Value, json};
use std::sync::Arc;

/// Per-call parameters forwarded into request payloads
#[derive(Debug, Clone, Default)]
pub struct InvokeParams {
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    extra: serde_json::Map<String, Value>,
}

impl InvokeParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Add an arbitrary top-level field to the request payload.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
}

/// Opaque client handle for one provider
pub struct ProviderClient {
    config: ProviderConfig,
    params: InvokeParams,
    endpoint: String,
    http: reqwest::Client,
    retry: RetryStrategy,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderClient {
    /// Construct a handle for `config`.
    ///
    /// Validates the endpoint URL and model up front so misconfiguration
    /// surfaces here (where the chain's breaker records it) instead of on
    /// the first invoke.
    pub(crate) fn connect(
        config: ProviderConfig,
        params: InvokeParams,
        http: reqwest::Client,
        retry: RetryStrategy,
        breaker: Arc<CircuitBreaker>,
    ) -> ProviderResult<Self> {
        if config.model().is_empty() {
            return Err(ProviderError::Config(format!(
                "Provider '{}' has no model configured",
                config.name()
            )));
        }

        let base = config.api_base().trim_end_matches('/');
        if base.is_empty() {
            return Err(ProviderError::Config(format!(
                "Provider '{}' has no API base URL configured",
                config.name()
            )));
        }

        let endpoint = match config.protocol() {
            ClientProtocol::OpenAiCompat => format!("{}/chat/completions", base),
            ClientProtocol::Anthropic => format!("{}/v1/messages", base),
            ClientProtocol::Ollama => format!("{}/api/chat", base),
        };

        reqwest::Url::parse(&endpoint).map_err(|e| {
            ProviderError::Config(format!(
                "Provider '{}' has an invalid API base '{}': {}",
                config.name(),
                config.api_base(),
                e
            ))
        })?;

        Ok(Self {
            config,
            params,
            endpoint,
            http,
            retry,
            breaker,
        })
    }

    pub fn provider_name(&self) -> &ProviderName {
        self.config.name()
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Send `prompt` to the provider and return the completion text.
    ///
    /// The retry-wrapped request sequence runs as one circuit breaker call:
    /// a recovered retry counts as a success, an exhausted one as a single
    /// failure.
    pub async fn invoke(&self, prompt: &str) -> ProviderResult<String> {
        self.breaker
            .call(|| async {
                self.retry.execute(|| self.request_once(prompt)).await
            })
            .await
    }

    async fn request_once(&self, prompt: &str) -> ProviderResult<String> {
        let payload = self.build_payload(prompt);
        let mut request = self.http.post(&self.endpoint).json(&payload);

        request = match self.config.protocol() {
            ClientProtocol::OpenAiCompat => request.bearer_auth(self.config.api_key()),
            ClientProtocol::Anthropic => request
                .header("x-api-key", self.config.api_key())
                .header("anthropic-version", "2023-06-01"),
            ClientProtocol::Ollama => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth(format!(
                "{} rejected credentials with {}",
                self.config.name(),
                status
            )));
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            return Err(ProviderError::Transient(format!(
                "{} returned {}",
                self.config.name(),
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!(
                "{} returned unexpected {}: {}",
                self.config.name(),
                status,
                truncate(&body, 200)
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse {
                provider: self.config.name().to_string(),
                reason: format!("response body is not JSON: {}", e),
            }
        })?;

        self.extract_text(&body)
    }

    /// Per-call params win over provider-level defaults.
    fn effective_temperature(&self) -> Option<f64> {
        self.params.temperature().or(self.config.temperature())
    }

    fn effective_max_tokens(&self) -> Option<u32> {
        self.params.max_tokens().or(self.config.max_tokens())
    }

    fn build_payload(&self, prompt: &str) -> Value {
        let messages = json!([{"role": "user", "content": prompt}]);

        let mut payload = match self.config.protocol() {
            ClientProtocol::OpenAiCompat => {
                let mut p = json!({
                    "model": self.config.model(),
                    "messages": messages,
                });
                if let Some(t) = self.effective_temperature() {
                    p["temperature"] = json!(t);
                }
                if let Some(m) = self.effective_max_tokens() {
                    p["max_tokens"] = json!(m);
                }
                p
            }
            ClientProtocol::Anthropic => {
                // max_tokens is mandatory for the messages API.
                let mut p = json!({
                    "model": self.config.model(),
                    "max_tokens": self.effective_max_tokens().unwrap_or(1024),
                    "messages": messages,
                });
                if let Some(t) = self.effective_temperature() {
                    p["temperature"] = json!(t);
                }
                p
            }
            ClientProtocol::Ollama => {
                let mut p = json!({
                    "model": self.config.model(),
                    "messages": messages,
                    "stream": false,
                });
                if let Some(t) = self.effective_temperature() {
                    p["options"] = json!({"temperature": t});
                }
                p
            }
        };

        if let Some(object) = payload.as_object_mut() {
            for (key, value) in &self.params.extra {
                object.insert(key.clone(), value.clone());
            }
        }

        payload
    }

    fn extract_text(&self, body: &Value) -> ProviderResult<String> {
        let text = match self.config.protocol() {
            ClientProtocol::OpenAiCompat => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str),
            ClientProtocol::Anthropic => {
                body.pointer("/content/0/text").and_then(Value::as_str)
            }
            ClientProtocol::Ollama => {
                body.pointer("/message/content").and_then(Value::as_str)
            }
        };

        match text {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            Some(_) => Err(ProviderError::InvalidResponse {
                provider: self.config.name().to_string(),
                reason: "completion text is empty".to_string(),
            }),
            None => Err(ProviderError::InvalidResponse {
                provider: self.config.name().to_string(),
                reason: "response is missing the completion text field".to_string(),
            }),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
