//! Integration tests for provider chain selection
//!
//! Covers the fall-through scenarios:
//! - an unconfigured provider is skipped and the next one resolves
//! - open breakers on every provider produce a terminal error naming them
//! - an empty environment produces the distinct "none configured" error
//! - exclusion sets steer selection to lower-priority providers

use breakwater::{
    Environment, ExclusionSet, InvokeParams, ProviderContext, ProviderError, ProviderName,
};

fn context_from(pairs: &[(&str, &str)]) -> ProviderContext {
    let env = Environment::from_pairs(pairs.iter().copied());
    ProviderContext::new(env).expect("context should build")
}

#[tokio::test]
async fn test_skips_unconfigured_provider_and_selects_next() {
    // Groq unconfigured, OpenAI configured: the chain falls through groq
    // and resolves an openai client.
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);

    let client = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await
        .expect("openai should be selected");

    assert_eq!(client.provider_name().as_str(), "openai");
}

#[tokio::test]
async fn test_priority_order_picks_first_configured() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("GROQ_API_KEY", "gsk-test"),
        ("OPENAI_API_KEY", "sk-test"),
        ("ANTHROPIC_API_KEY", "ak-test"),
    ]);

    let client = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await
        .expect("groq should be selected first");
    assert_eq!(client.provider_name().as_str(), "groq");
}

#[tokio::test]
async fn test_exclusion_steers_to_next_provider() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("GROQ_API_KEY", "gsk-test"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);

    let mut exclude = ExclusionSet::new();
    exclude.insert(ProviderName::from("groq"));

    let client = context
        .get_client(exclude, InvokeParams::new())
        .await
        .expect("openai should be selected when groq is excluded");
    assert_eq!(client.provider_name().as_str(), "openai");
}

#[tokio::test]
async fn test_all_breakers_open_raises_all_unavailable() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("CIRCUIT_BREAKER_THRESHOLD", "1"),
        ("GROQ_API_KEY", "gsk-test"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);
    context.discover().await;

    // Trip every provider's breaker.
    for name in ["provider_groq", "provider_openai"] {
        let breaker = context.breakers().breaker(name).await;
        let result: Result<String, _> = breaker
            .call(|| async { Err(ProviderError::Transient("down".to_string())) })
            .await;
        assert!(result.is_err());
    }

    let result = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await;

    match result {
        Err(ProviderError::AllUnavailable { providers }) => {
            assert!(providers.contains("groq"), "message names groq: {}", providers);
            assert!(
                providers.contains("openai"),
                "message names openai: {}",
                providers
            );
        }
        other => panic!("expected AllUnavailable, got {:?}", other.map(|_| "client")),
    }
}

#[tokio::test]
async fn test_empty_environment_raises_none_configured() {
    let context = context_from(&[("PROVIDER_HEALTH_CHECK_ENABLED", "false")]);

    let result = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await;

    assert!(matches!(result, Err(ProviderError::NoneConfigured)));
}

#[tokio::test]
async fn test_everything_excluded_is_all_unavailable_not_none_configured() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);

    let mut exclude = ExclusionSet::new();
    exclude.insert(ProviderName::from("openai"));

    let result = context.get_client(exclude, InvokeParams::new()).await;

    match result {
        Err(ProviderError::AllUnavailable { providers }) => {
            assert!(providers.contains("openai"));
            assert!(providers.contains("excluded"));
        }
        other => panic!("expected AllUnavailable, got {:?}", other.map(|_| "client")),
    }
}

#[tokio::test]
async fn test_open_breaker_falls_through_to_next_provider() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("CIRCUIT_BREAKER_THRESHOLD", "1"),
        ("GROQ_API_KEY", "gsk-test"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);
    context.discover().await;

    let breaker = context.breakers().breaker("provider_groq").await;
    let result: Result<String, _> = breaker
        .call(|| async { Err(ProviderError::Transient("down".to_string())) })
        .await;
    assert!(result.is_err());

    // Groq's breaker is open; selection silently moves on to openai.
    let client = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await
        .expect("openai should absorb groq's failure");
    assert_eq!(client.provider_name().as_str(), "openai");
}

#[tokio::test]
async fn test_custom_provider_resolves_via_catch_all() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("TOGETHER_API_KEY", "tk-test"),
        ("TOGETHER_API_BASE", "https://api.together.xyz/v1"),
        ("TOGETHER_MODEL", "meta-llama/Llama-3-70b"),
    ]);

    let client = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await
        .expect("custom provider should resolve through the catch-all");
    assert_eq!(client.provider_name().as_str(), "together");
}

#[tokio::test]
async fn test_breaker_reset_restores_selection() {
    let context = context_from(&[
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("CIRCUIT_BREAKER_THRESHOLD", "1"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);
    context.discover().await;

    let breaker = context.breakers().breaker("provider_openai").await;
    let result: Result<String, _> = breaker
        .call(|| async { Err(ProviderError::Transient("down".to_string())) })
        .await;
    assert!(result.is_err());

    let failed = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await;
    assert!(matches!(failed, Err(ProviderError::AllUnavailable { .. })));

    context.reset_breakers().await;

    let client = context
        .get_client(ExclusionSet::new(), InvokeParams::new())
        .await
        .expect("reset breakers admit openai again");
    assert_eq!(client.provider_name().as_str(), "openai");
}
