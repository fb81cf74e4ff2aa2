//! Configuration management for Breakwater
//!
//! All tuning knobs are read from environment variables, captured once into
//! an [`Environment`] snapshot at construction time. Tests build snapshots
//! from literal pairs instead of mutating process-global state.

use crate::error::{ProviderError, ProviderResult};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default provider priority order, lowest index tried first.
pub const DEFAULT_PRIORITY_ORDER: [&str; 5] =
    ["groq", "openai", "deepseek", "anthropic", "ollama"];

/// Priority assigned to providers that are not in the priority order list.
/// High value so custom providers sort after every listed one.
pub const UNLISTED_PROVIDER_PRIORITY: u32 = 1000;

/// Immutable snapshot of environment variables
///
/// Captured once per process (or built from pairs in tests) so that
/// discovery and settings construction observe a single consistent view,
/// regardless of what happens to the process environment afterwards.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from literal key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// All keys ending with the given suffix (used to find `*_API_KEY`).
    pub fn keys_with_suffix<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a str> {
        self.vars
            .keys()
            .map(String::as_str)
            .filter(move |k| k.ends_with(suffix))
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> ProviderResult<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|_| {
                ProviderError::Config(format!("{} has unparseable value '{}'", key, raw))
            }),
        }
    }

    fn parse_bool_or(&self, key: &str, default: bool) -> ProviderResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ProviderError::Config(format!(
                    "{} must be a boolean, got '{}'",
                    key, other
                ))),
            },
        }
    }
}

/// Backoff strategy for computing inter-attempt delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

impl BackoffStrategy {
    fn from_env_value(raw: &str) -> ProviderResult<Self> {
        match raw.to_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fixed" => Ok(Self::Fixed),
            other => Err(ProviderError::Config(format!(
                "RETRY_BACKOFF_STRATEGY must be exponential, linear, or fixed, got '{}'",
                other
            ))),
        }
    }
}

/// Retry tuning
///
/// Stateless; one instance is shared by every retry execution. Constructed
/// through [`RetryConfig::new`] so invalid combinations are rejected before
/// any retry loop runs with them.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: BackoffStrategy,
    jitter_enabled: bool,
}

impl RetryConfig {
    /// Create a validated retry configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero or `max_delay` is shorter
    /// than `base_delay`.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff: BackoffStrategy,
        jitter_enabled: bool,
    ) -> ProviderResult<Self> {
        if max_attempts == 0 {
            return Err(ProviderError::Config(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if max_delay < base_delay {
            return Err(ProviderError::Config(format!(
                "RETRY_MAX_DELAY ({:?}) must not be shorter than RETRY_BASE_DELAY ({:?})",
                max_delay, base_delay
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff,
            jitter_enabled,
        })
    }

    fn from_environment(env: &Environment) -> ProviderResult<Self> {
        let max_attempts = env.parse_or("RETRY_MAX_ATTEMPTS", 3u32)?;
        let base_delay = Duration::from_secs_f64(env.parse_or("RETRY_BASE_DELAY", 1.0f64)?);
        let max_delay = Duration::from_secs_f64(env.parse_or("RETRY_MAX_DELAY", 10.0f64)?);
        let backoff = match env.get("RETRY_BACKOFF_STRATEGY") {
            Some(raw) => BackoffStrategy::from_env_value(raw)?,
            None => BackoffStrategy::Exponential,
        };
        let jitter_enabled = env.parse_bool_or("RETRY_JITTER_ENABLED", true)?;
        Self::new(max_attempts, base_delay, max_delay, backoff, jitter_enabled)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff(&self) -> BackoffStrategy {
        self.backoff
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter_enabled
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff: BackoffStrategy::Exponential,
            jitter_enabled: true,
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    timeout: Duration,
    half_open_attempts: u32,
}

impl CircuitBreakerConfig {
    /// Create a validated circuit breaker configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `failure_threshold` or `half_open_attempts` is zero.
    pub fn new(
        failure_threshold: u32,
        timeout: Duration,
        half_open_attempts: u32,
    ) -> ProviderResult<Self> {
        if failure_threshold == 0 {
            return Err(ProviderError::Config(
                "CIRCUIT_BREAKER_THRESHOLD must be at least 1".to_string(),
            ));
        }
        if half_open_attempts == 0 {
            return Err(ProviderError::Config(
                "CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            failure_threshold,
            timeout,
            half_open_attempts,
        })
    }

    fn from_environment(env: &Environment) -> ProviderResult<Self> {
        let threshold = env.parse_or("CIRCUIT_BREAKER_THRESHOLD", 5u32)?;
        let timeout = Duration::from_secs_f64(env.parse_or("CIRCUIT_BREAKER_TIMEOUT", 60.0f64)?);
        let half_open = env.parse_or("CIRCUIT_BREAKER_HALF_OPEN_ATTEMPTS", 1u32)?;
        Self::new(threshold, timeout, half_open)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn half_open_attempts(&self) -> u32 {
        self.half_open_attempts
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_attempts: 1,
        }
    }
}

/// Root settings for the provider subsystem
#[derive(Debug, Clone)]
pub struct Settings {
    priority_order: Vec<String>,
    health_check_enabled: bool,
    health_check_timeout: Duration,
    health_cache_ttl: Duration,
    breaker: CircuitBreakerConfig,
    retry: RetryConfig,
}

impl Settings {
    /// Build settings from an environment snapshot.
    pub fn from_environment(env: &Environment) -> ProviderResult<Self> {
        let priority_order = match env.get("PROVIDER_PRIORITY_ORDER") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_PRIORITY_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Ok(Self {
            priority_order,
            health_check_enabled: env.parse_bool_or("PROVIDER_HEALTH_CHECK_ENABLED", true)?,
            health_check_timeout: Duration::from_secs_f64(
                env.parse_or("PROVIDER_HEALTH_CHECK_TIMEOUT", 2.0f64)?,
            ),
            health_cache_ttl: Duration::from_secs_f64(
                env.parse_or("HEALTH_CHECK_CACHE_TTL", 30.0f64)?,
            ),
            breaker: CircuitBreakerConfig::from_environment(env)?,
            retry: RetryConfig::from_environment(env)?,
        })
    }

    /// Priority for a provider name: its index in the configured order, or
    /// [`UNLISTED_PROVIDER_PRIORITY`] for names the list does not mention.
    pub fn priority_for(&self, name: &str) -> u32 {
        self.priority_order
            .iter()
            .position(|p| p == name)
            .map(|idx| idx as u32)
            .unwrap_or(UNLISTED_PROVIDER_PRIORITY)
    }

    pub fn priority_order(&self) -> &[String] {
        &self.priority_order
    }

    pub fn health_check_enabled(&self) -> bool {
        self.health_check_enabled
    }

    pub fn health_check_timeout(&self) -> Duration {
        self.health_check_timeout
    }

    pub fn health_cache_ttl(&self) -> Duration {
        self.health_cache_ttl
    }

    pub fn breaker(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            priority_order: DEFAULT_PRIORITY_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            health_check_enabled: true,
            health_check_timeout: Duration::from_secs(2),
            health_cache_ttl: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_get_treats_empty_as_unset() {
        let env = Environment::from_pairs([("FOO", ""), ("BAR", "  "), ("BAZ", "value")]);
        assert_eq!(env.get("FOO"), None);
        assert_eq!(env.get("BAR"), None);
        assert_eq!(env.get("BAZ"), Some("value"));
        assert_eq!(env.get("MISSING"), None);
    }

    #[test]
    fn test_environment_keys_with_suffix() {
        let env = Environment::from_pairs([
            ("GROQ_API_KEY", "k1"),
            ("MISTRAL_API_KEY", "k2"),
            ("GROQ_MODEL", "m"),
        ]);
        let mut keys: Vec<&str> = env.keys_with_suffix("_API_KEY").collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["GROQ_API_KEY", "MISTRAL_API_KEY"]);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_environment(&Environment::default())
            .expect("empty environment should produce default settings");

        assert_eq!(
            settings.priority_order(),
            &["groq", "openai", "deepseek", "anthropic", "ollama"]
        );
        assert!(settings.health_check_enabled());
        assert_eq!(settings.health_check_timeout(), Duration::from_secs(2));
        assert_eq!(settings.health_cache_ttl(), Duration::from_secs(30));
        assert_eq!(settings.breaker().failure_threshold(), 5);
        assert_eq!(settings.breaker().timeout(), Duration::from_secs(60));
        assert_eq!(settings.breaker().half_open_attempts(), 1);
        assert_eq!(settings.retry().max_attempts(), 3);
        assert_eq!(settings.retry().base_delay(), Duration::from_secs(1));
        assert_eq!(settings.retry().max_delay(), Duration::from_secs(10));
        assert_eq!(settings.retry().backoff(), BackoffStrategy::Exponential);
        assert!(settings.retry().jitter_enabled());
    }

    #[test]
    fn test_settings_custom_priority_order() {
        let env = Environment::from_pairs([("PROVIDER_PRIORITY_ORDER", "ollama, openai ,groq")]);
        let settings = Settings::from_environment(&env).expect("settings should parse");

        assert_eq!(settings.priority_order(), &["ollama", "openai", "groq"]);
        assert_eq!(settings.priority_for("ollama"), 0);
        assert_eq!(settings.priority_for("openai"), 1);
        assert_eq!(settings.priority_for("groq"), 2);
        assert_eq!(
            settings.priority_for("anthropic"),
            UNLISTED_PROVIDER_PRIORITY
        );
    }

    #[test]
    fn test_settings_rejects_bad_boolean() {
        let env = Environment::from_pairs([("PROVIDER_HEALTH_CHECK_ENABLED", "maybe")]);
        let result = Settings::from_environment(&env);
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_settings_rejects_unparseable_number() {
        let env = Environment::from_pairs([("RETRY_MAX_ATTEMPTS", "lots")]);
        let result = Settings::from_environment(&env);
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_retry_config_rejects_zero_attempts() {
        let result = RetryConfig::new(
            0,
            Duration::from_secs(1),
            Duration::from_secs(10),
            BackoffStrategy::Fixed,
            false,
        );
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_retry_config_rejects_max_below_base() {
        let result = RetryConfig::new(
            3,
            Duration::from_secs(10),
            Duration::from_secs(1),
            BackoffStrategy::Fixed,
            false,
        );
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_breaker_config_rejects_zero_threshold() {
        let result = CircuitBreakerConfig::new(0, Duration::from_secs(60), 1);
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_breaker_config_rejects_zero_half_open_attempts() {
        let result = CircuitBreakerConfig::new(5, Duration::from_secs(60), 0);
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_backoff_strategy_parsing() {
        let env = Environment::from_pairs([("RETRY_BACKOFF_STRATEGY", "linear")]);
        let settings = Settings::from_environment(&env).expect("settings should parse");
        assert_eq!(settings.retry().backoff(), BackoffStrategy::Linear);

        let env = Environment::from_pairs([("RETRY_BACKOFF_STRATEGY", "FIXED")]);
        let settings = Settings::from_environment(&env).expect("settings should parse");
        assert_eq!(settings.retry().backoff(), BackoffStrategy::Fixed);

        let env = Environment::from_pairs([("RETRY_BACKOFF_STRATEGY", "random")]);
        assert!(Settings::from_environment(&env).is_err());
    }

    #[test]
    fn test_fractional_delays_parse() {
        let env = Environment::from_pairs([
            ("RETRY_BASE_DELAY", "0.25"),
            ("RETRY_MAX_DELAY", "2.5"),
            ("CIRCUIT_BREAKER_TIMEOUT", "0.5"),
        ]);
        let settings = Settings::from_environment(&env).expect("settings should parse");
        assert_eq!(settings.retry().base_delay(), Duration::from_millis(250));
        assert_eq!(settings.retry().max_delay(), Duration::from_millis(2500));
        assert_eq!(settings.breaker().timeout(), Duration::from_millis(500));
    }
}
