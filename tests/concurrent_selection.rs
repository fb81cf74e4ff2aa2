//! Integration tests for concurrent use of the provider subsystem
//!
//! The registry, health cache, and breakers are shared process-wide state;
//! these tests verify concurrent callers observe a consistent provider set
//! and that the breaker's admission lock never serializes the wrapped
//! operations themselves.

use breakwater::{
    CircuitBreaker, CircuitBreakerConfig, Environment, ExclusionSet, InvokeParams,
    ProviderContext,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_concurrent_get_client_all_succeed() {
    let env = Environment::from_pairs([
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("GROQ_API_KEY", "gsk-test"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);
    let context = Arc::new(ProviderContext::new(env).expect("context should build"));

    let mut handles = vec![];
    for _ in 0..10 {
        let context = context.clone();
        handles.push(tokio::spawn(async move {
            context
                .get_client(ExclusionSet::new(), InvokeParams::new())
                .await
                .map(|c| c.provider_name().to_string())
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    assert_eq!(results.len(), 10);
    for result in results {
        let provider = result.expect("every concurrent selection succeeds");
        assert_eq!(provider, "groq", "highest-priority provider wins for all");
    }
}

#[tokio::test]
async fn test_concurrent_discovery_runs_once() {
    let env = Environment::from_pairs([
        ("PROVIDER_HEALTH_CHECK_ENABLED", "false"),
        ("OPENAI_API_KEY", "sk-test"),
    ]);
    let context = Arc::new(ProviderContext::new(env).expect("context should build"));

    let mut handles = vec![];
    for _ in 0..8 {
        let context = context.clone();
        handles.push(tokio::spawn(async move { context.discover().await }));
    }

    for handle in handles {
        let count = handle.await.expect("task should not panic");
        assert_eq!(count, 1, "every caller observes the same provider set");
    }
}

#[tokio::test]
async fn test_breaker_does_not_serialize_wrapped_operations() {
    // Two 100ms operations through the same breaker must overlap: the lock
    // covers only admission bookkeeping, not the operation.
    let breaker = Arc::new(CircuitBreaker::new(
        "provider_test",
        CircuitBreakerConfig::default(),
    ));

    let started = Instant::now();
    let mut handles = vec![];
    for _ in 0..2 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            breaker
                .call(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok("done".to_string())
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.expect("task should not panic");
        assert!(result.is_ok());
    }

    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(180),
        "operations should overlap, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_concurrent_failures_open_breaker_exactly_once() {
    let breaker = Arc::new(CircuitBreaker::new(
        "provider_test",
        CircuitBreakerConfig::new(5, Duration::from_secs(60), 1).expect("valid config"),
    ));

    let mut handles = vec![];
    for _ in 0..20 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            let result: Result<String, _> = breaker
                .call(|| async {
                    Err(breakwater::ProviderError::Transient("down".to_string()))
                })
                .await;
            result
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;

    // Every call fails (either the operation error or a breaker rejection),
    // and afterwards the breaker is open.
    for result in results {
        assert!(result.expect("task should not panic").is_err());
    }
    assert_eq!(
        breaker.state().await,
        breakwater::CircuitState::Open,
        "breaker settles open after concurrent failures"
    );
}
