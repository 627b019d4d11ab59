//! Redis cache backend.
//!
//! # Key Patterns
//!
//! Every key is stored as `{key_prefix}{key}` so several deployments can
//! share one Redis instance. Values are JSON strings.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so each operation clones it instead of locking.
//!
//! # Failure Handling
//!
//! Every command runs under the configured operation timeout. Connection
//! errors surface as [`CacheError::Unavailable`], expired timeouts as
//! [`CacheError::Timeout`]. Inside `upsert` a failed read counts as a miss
//! and a failed write is logged, so population still returns a value while
//! Redis is down.

use crate::backend::{CacheBackend, Supplier};
use crate::errors::CacheError;
use crate::metrics::record_cache_operation;
use crate::single_flight::{acquire, populate, InFlight};
use async_trait::async_trait;
use common::config::{RedisConfig, DEFAULT_POPULATION_TIMEOUT};
use common::secret::ExposeSecret;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

const BACKEND: &str = "redis";

/// Build the namespaced Redis key for `key`.
pub(crate) fn namespaced_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Redis-backed cache.
///
/// This struct is cheaply cloneable; clones share the connection and the
/// single-flight gates.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    key_prefix: String,
    operation_timeout: Duration,
    population_timeout: Duration,
    flights: Arc<InFlight<tokio::sync::Mutex<()>>>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .field("operation_timeout", &self.operation_timeout)
            .field("population_timeout", &self.population_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if the URL cannot be parsed,
    /// `CacheError::Unavailable` if the connection fails, and
    /// `CacheError::Timeout` if it does not complete within
    /// `config.connect_timeout`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url.expose_secret()).map_err(|e| {
            // Note: Do NOT log the URL as it may contain credentials
            error!(target: "gk.cache.redis", error = %e, "Failed to open Redis client");
            CacheError::Configuration(format!("Invalid Redis URL: {e}"))
        })?;

        let connection = tokio::time::timeout(
            config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            error!(
                target: "gk.cache.redis",
                timeout_ms = config.connect_timeout.as_millis() as u64,
                "Timed out connecting to Redis"
            );
            CacheError::Timeout(config.connect_timeout)
        })?
        .map_err(|e| {
            error!(target: "gk.cache.redis", error = %e, "Failed to connect to Redis");
            CacheError::Unavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        debug!(target: "gk.cache.redis", key_prefix = %config.key_prefix, "Connected to Redis");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            operation_timeout: config.operation_timeout,
            population_timeout: DEFAULT_POPULATION_TIMEOUT,
            flights: Arc::new(InFlight::new()),
        })
    }

    /// Bound how long `upsert` suppliers (and callers waiting on them) may run.
    #[must_use]
    pub fn with_population_timeout(mut self, timeout: Duration) -> Self {
        self.population_timeout = timeout;
        self
    }

    /// Namespace prepended to every key.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Run one Redis command under the operation timeout.
    async fn run<T>(
        &self,
        operation: &'static str,
        command: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.operation_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(target: "gk.cache.redis", error = %e, operation, "Redis command failed");
                record_cache_operation(BACKEND, operation, "error");
                Err(CacheError::Unavailable(format!("Redis {operation} failed: {e}")))
            }
            Err(_) => {
                warn!(
                    target: "gk.cache.redis",
                    operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                record_cache_operation(BACKEND, operation, "timeout");
                Err(CacheError::Timeout(self.operation_timeout))
            }
        }
    }

    /// Read used by `upsert`: an unreachable backend or an undecodable value
    /// is treated as a miss.
    async fn read_for_upsert(&self, key: &str) -> Option<Value> {
        match CacheBackend::get(self, key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(target: "gk.cache.redis", error = %e, key = %key, "Treating failed read as a miss");
                None
            }
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection.clone();
        let redis_key = namespaced_key(&self.key_prefix, key);

        let raw: Option<String> = self.run("get", conn.get(&redis_key)).await?;

        match raw {
            Some(raw) => {
                record_cache_operation(BACKEND, "get", "hit");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => {
                record_cache_operation(BACKEND, "get", "miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let redis_key = namespaced_key(&self.key_prefix, key);
        let payload = serde_json::to_string(&value)?;

        match ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                let millis = expiry_millis(ttl);
                let () = self.run("set", conn.pset_ex(&redis_key, payload, millis)).await?;
            }
            None => {
                let () = self.run("set", conn.set(&redis_key, payload)).await?;
            }
        }

        record_cache_operation(BACKEND, "set", "ok");
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let redis_key = namespaced_key(&self.key_prefix, key);

        let () = self.run("del", conn.del(&redis_key)).await?;

        record_cache_operation(BACKEND, "del", "ok");
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn upsert(
        &self,
        key: &str,
        supplier: Supplier,
        ttl: Option<Duration>,
    ) -> Result<Value, CacheError> {
        if let Some(value) = self.read_for_upsert(key).await {
            record_cache_operation(BACKEND, "upsert", "hit");
            return Ok(value);
        }

        let gate = self.flights.gate(key);
        let result: Result<Value, CacheError> = async {
            let _guard = acquire(&gate, self.population_timeout).await?;

            if let Some(value) = self.read_for_upsert(key).await {
                record_cache_operation(BACKEND, "upsert", "hit");
                return Ok(value);
            }

            let value = populate(supplier, self.population_timeout)
                .await
                .inspect_err(|_| record_cache_operation(BACKEND, "upsert", "error"))?;

            if let Err(e) = CacheBackend::set(self, key, value.clone(), ttl).await {
                warn!(
                    target: "gk.cache.redis",
                    error = %e,
                    "Failed to store populated value, returning it uncached"
                );
            }

            record_cache_operation(BACKEND, "upsert", "populated");
            Ok::<_, CacheError>(value)
        }
        .await;
        self.flights.release(key, &gate);

        result
    }
}

/// `PSETEX` argument for a non-zero TTL: at least 1 ms, at most `i64::MAX`.
fn expiry_millis(ttl: Duration) -> u64 {
    const MAX_EXPIRY_MILLIS: u64 = i64::MAX as u64;

    let partial = u128::from(ttl.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(ttl.as_millis() + partial)
        .unwrap_or(MAX_EXPIRY_MILLIS)
        .clamp(1, MAX_EXPIRY_MILLIS)
}
