//! Error types for Breakwater
//!
//! Classifies failures into retryable (transient network trouble) and
//! non-retryable (auth, configuration) so the retry layer can fail fast
//! on errors that waiting will not fix.

use thiserror::Error;

/// Main error type for the provider subsystem
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient failure: timeouts, connection resets, 5xx, rate limiting.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider rejected our credentials (401/403/invalid key).
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The provider answered but the completion was unusable (empty text).
    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    /// Admission denied by a circuit breaker that is currently open.
    #[error("Circuit breaker '{name}' is open; retry in {retry_in_seconds:.1}s")]
    CircuitOpen {
        name: String,
        retry_in_seconds: f64,
    },

    /// Terminal: discovery found no provider with usable credentials.
    #[error(
        "No LLM providers are configured. Set at least one of GROQ_API_KEY, OPENAI_API_KEY, \
         DEEPSEEK_API_KEY, ANTHROPIC_API_KEY, or OLLAMA_API_BASE + OLLAMA_MODEL."
    )]
    NoneConfigured,

    /// Terminal: providers exist but every one of them was skipped or failed.
    #[error("All configured providers are unavailable: {providers}")]
    AllUnavailable { providers: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Returns true if retrying this error may succeed.
    ///
    /// Typed variants are classified directly. `Internal` errors carry
    /// messages from layers we do not control, so they go through the
    /// keyword heuristics in [`message_suggests_retryable`]; anything the
    /// heuristics cannot place defaults to non-retryable (fail fast on
    /// unknown errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transient(_) => true,
            ProviderError::InvalidResponse { .. } => true,
            ProviderError::Config(_)
            | ProviderError::Auth(_)
            | ProviderError::CircuitOpen { .. }
            | ProviderError::NoneConfigured
            | ProviderError::AllUnavailable { .. } => false,
            ProviderError::Internal(message) => {
                message_suggests_retryable(message).unwrap_or(false)
            }
        }
    }
}

/// Keyword heuristics for errors that arrive without a useful type.
///
/// Returns `Some(true)` for network-ish messages, `Some(false)` for
/// auth-ish messages, and `None` when the message matches neither set.
pub fn message_suggests_retryable(message: &str) -> Option<bool> {
    const RETRYABLE_MARKERS: [&str; 7] = [
        "connection",
        "timeout",
        "rate limit",
        "503",
        "502",
        "504",
        "unavailable",
    ];
    const NON_RETRYABLE_MARKERS: [&str; 5] =
        ["api key", "authentication", "forbidden", "401", "403"];

    let lowered = message.to_lowercase();

    // Auth markers win over network markers: a "401 connection rejected"
    // style message must not burn retry budget.
    if NON_RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Some(false);
    }
    if RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Some(true);
    }
    None
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::Transient(err.to_string())
        } else {
            ProviderError::Internal(err.to_string())
        }
    }
}

/// Convenience type alias for Results
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        let err = ProviderError::Transient("connection reset by peer".to_string());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_response_is_retryable() {
        let err = ProviderError::InvalidResponse {
            provider: "openai".to_string(),
            reason: "empty completion text".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_auth_is_not_retryable() {
        let err = ProviderError::Auth("invalid api key".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_config_is_not_retryable() {
        let err = ProviderError::Config("missing model".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_circuit_open_is_not_retryable() {
        let err = ProviderError::CircuitOpen {
            name: "provider_groq".to_string(),
            retry_in_seconds: 12.5,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_network_keywords_are_retryable() {
        for message in [
            "connection refused",
            "read timeout exceeded",
            "rate limit hit, slow down",
            "upstream returned 503",
            "bad gateway 502",
            "gateway timeout 504",
            "service temporarily unavailable",
        ] {
            let err = ProviderError::Internal(message.to_string());
            assert!(err.is_retryable(), "expected retryable: {}", message);
        }
    }

    #[test]
    fn test_internal_auth_keywords_are_not_retryable() {
        for message in [
            "invalid API key provided",
            "authentication failed",
            "403 Forbidden",
            "server said 401",
        ] {
            let err = ProviderError::Internal(message.to_string());
            assert!(!err.is_retryable(), "expected non-retryable: {}", message);
        }
    }

    #[test]
    fn test_internal_unknown_message_defaults_to_non_retryable() {
        let err = ProviderError::Internal("something inexplicable happened".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_marker_wins_over_network_marker() {
        // "401" plus "connection" in one message must fail fast.
        let err = ProviderError::Internal("connection rejected with 401".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_circuit_open_message_includes_wait() {
        let err = ProviderError::CircuitOpen {
            name: "provider_ollama".to_string(),
            retry_in_seconds: 30.0,
        };
        assert!(err.to_string().contains("provider_ollama"));
        assert!(err.to_string().contains("30.0"));
    }

    #[test]
    fn test_all_unavailable_names_providers() {
        let err = ProviderError::AllUnavailable {
            providers: "groq, openai".to_string(),
        };
        assert!(err.to_string().contains("groq, openai"));
    }
}
