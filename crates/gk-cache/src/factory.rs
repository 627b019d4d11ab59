//! Backend selection.
//!
//! `CacheFactory` owns two caches:
//!
//! - the **primary** cache, local or Redis depending on [`CacheMethod`]
//! - the **secrets** cache, always in-process, used for key material that
//!   must never leave the process

use crate::backend::{CacheBackend, Supplier};
use crate::errors::CacheError;
use crate::local::LocalCache;
use crate::remote::RedisCache;
use async_trait::async_trait;
use common::config::{RedisConfig, DEFAULT_POPULATION_TIMEOUT};
use common::secret::SecretString;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which backend serves as the primary cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMethod {
    /// In-process map
    #[default]
    Local,
    /// Shared Redis instance
    Redis,
}

impl CacheMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMethod::Local => "local",
            CacheMethod::Redis => "redis",
        }
    }
}

impl fmt::Display for CacheMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMethod {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(CacheMethod::Local),
            "redis" => Ok(CacheMethod::Redis),
            other => Err(CacheError::Configuration(format!(
                "Unknown cache method '{other}', expected 'local' or 'redis'"
            ))),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub method: CacheMethod,
    /// Required when `method` is `Redis`
    pub redis: Option<RedisConfig>,
    /// Bound on `upsert` population for every backend
    pub population_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            method: CacheMethod::Local,
            redis: None,
            population_timeout: DEFAULT_POPULATION_TIMEOUT,
        }
    }
}

/// Entry point to the cache layer.
///
/// Cloning is cheap; clones share both caches.
#[derive(Clone)]
pub struct CacheFactory {
    method: CacheMethod,
    primary: Arc<dyn CacheBackend>,
    secrets: Arc<LocalCache<SecretString>>,
}

impl fmt::Debug for CacheFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFactory")
            .field("method", &self.method)
            .field("primary", &self.primary.name())
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl CacheFactory {
    /// Build the caches described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when Redis is selected without a
    /// Redis configuration, or any error from [`RedisCache::connect`].
    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let primary: Arc<dyn CacheBackend> = match config.method {
            CacheMethod::Local => Arc::new(
                LocalCache::<Value>::new().with_population_timeout(config.population_timeout),
            ),
            CacheMethod::Redis => {
                let redis = config.redis.as_ref().ok_or_else(|| {
                    CacheError::Configuration(
                        "Cache method 'redis' requires a Redis URL".to_string(),
                    )
                })?;
                Arc::new(
                    RedisCache::connect(redis)
                        .await?
                        .with_population_timeout(config.population_timeout),
                )
            }
        };

        info!(target: "gk.cache", method = %config.method, "Cache initialized");

        Ok(Self {
            method: config.method,
            primary,
            secrets: Self::secrets_cache(config.population_timeout),
        })
    }

    /// Factory with an in-process primary cache and default settings.
    #[must_use]
    pub fn local() -> Self {
        Self::with_primary(
            CacheMethod::Local,
            Arc::new(LocalCache::<Value>::new()),
        )
    }

    /// Factory around an already-built primary backend.
    #[must_use]
    pub fn with_primary(method: CacheMethod, primary: Arc<dyn CacheBackend>) -> Self {
        Self {
            method,
            primary,
            secrets: Self::secrets_cache(DEFAULT_POPULATION_TIMEOUT),
        }
    }

    fn secrets_cache(population_timeout: Duration) -> Arc<LocalCache<SecretString>> {
        Arc::new(LocalCache::named("secrets").with_population_timeout(population_timeout))
    }

    #[must_use]
    pub fn method(&self) -> CacheMethod {
        self.method
    }

    /// The configured primary backend.
    #[must_use]
    pub fn primary(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.primary)
    }

    /// The in-process cache for key material. Never backed by Redis.
    #[must_use]
    pub fn secrets(&self) -> Arc<LocalCache<SecretString>> {
        Arc::clone(&self.secrets)
    }
}

/// The factory itself behaves as its primary cache.
#[async_trait]
impl CacheBackend for CacheFactory {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.primary.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.primary.set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.primary.del(key).await
    }

    async fn upsert(
        &self,
        key: &str,
        supplier: Supplier,
        ttl: Option<Duration>,
    ) -> Result<Value, CacheError> {
        self.primary.upsert(key, supplier, ttl).await
    }
}
