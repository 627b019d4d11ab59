//! Redis backend tests.
//!
//! These need a reachable Redis server and are ignored by default:
//!
//! ```bash
//! REDIS_URL=redis://127.0.0.1:6379 cargo test -p gk-cache -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::config::RedisConfig;
use gk_cache::{supplier_fn, CacheBackend, CacheConfig, CacheFactory, CacheMethod, RedisCache};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn redis_config() -> RedisConfig {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let mut config = RedisConfig::new(url);
    // Unique namespace per run so parallel test runs do not collide
    config.key_prefix = format!("gk-test-{}:", std::process::id());
    config
}

#[tokio::test]
async fn test_factory_fails_fast_when_redis_unreachable() -> Result<(), anyhow::Error> {
    // Arrange
    let mut redis = RedisConfig::new("redis://127.0.0.1:1/");
    redis.connect_timeout = Duration::from_secs(2);
    let config = CacheConfig {
        method: CacheMethod::Redis,
        redis: Some(redis),
        ..CacheConfig::default()
    };

    // Act
    let result = CacheFactory::from_config(&config).await;

    // Assert
    let err = result.expect_err("connecting to a closed port must fail");
    assert!(err.is_unavailable(), "expected unavailable, got {err:?}");

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_redis_round_trip() -> Result<(), anyhow::Error> {
    // Arrange
    let cache = RedisCache::connect(&redis_config()).await?;

    // Act
    cache.set("TEST", json!({"a": 1, "b": 2}), None).await?;
    let stored = cache.get("TEST").await?;
    cache.del("TEST").await?;
    let removed = cache.get("TEST").await?;

    // Assert
    assert_eq!(stored, Some(json!({"a": 1, "b": 2})));
    assert_eq!(removed, None);

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_redis_ttl_expires_entry() -> Result<(), anyhow::Error> {
    // Arrange
    let cache = RedisCache::connect(&redis_config()).await?;

    // Act
    cache
        .set("ttl-key", json!("short-lived"), Some(Duration::from_millis(200)))
        .await?;
    let before = cache.get("ttl-key").await?;
    tokio::time::sleep(Duration::from_millis(400)).await;
    let after = cache.get("ttl-key").await?;

    // Assert
    assert_eq!(before, Some(json!("short-lived")));
    assert_eq!(after, None);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running Redis instance"]
async fn test_redis_upsert_single_flight() -> Result<(), anyhow::Error> {
    // Arrange
    let cache = Arc::new(RedisCache::connect(&redis_config()).await?);
    cache.del("upsert-key").await?;
    let calls = Arc::new(AtomicUsize::new(0));

    // Act
    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .upsert(
                    "upsert-key",
                    supplier_fn(move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!("populated"))
                    }),
                    Some(Duration::from_secs(30)),
                )
                .await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await??);
    }
    cache.del("upsert-key").await?;

    // Assert
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| v == &json!("populated")));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn test_prefix_isolates_deployments() -> Result<(), anyhow::Error> {
    // Arrange
    let mut first_config = redis_config();
    first_config.key_prefix.push_str("a:");
    let mut second_config = redis_config();
    second_config.key_prefix.push_str("b:");
    let first = RedisCache::connect(&first_config).await?;
    let second = RedisCache::connect(&second_config).await?;

    // Act
    first.set("shared-name", json!("from-a"), None).await?;
    let seen_by_second = second.get("shared-name").await?;
    first.del("shared-name").await?;

    // Assert
    assert_eq!(seen_by_second, None);

    Ok(())
}
