//! Common configuration types for Gatekeeper components.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default namespace prepended to every Redis key.
pub const DEFAULT_CACHE_PREFIX: &str = "gk:";

/// Default time allowed to establish the Redis connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for a single Redis command.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time a cache population (`upsert` supplier) may run before
/// waiting callers give up.
pub const DEFAULT_POPULATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Redis configuration for the networked cache backend.
///
/// The URL is held as a secret because it may embed credentials
/// (`redis://:password@host:port`).
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: SecretString,
    /// Namespace prepended to every key, so deployments sharing one Redis
    /// instance do not collide
    pub key_prefix: String,
    /// Maximum time to establish the connection
    pub connect_timeout: Duration,
    /// Maximum time for a single command
    pub operation_timeout: Duration,
}

impl RedisConfig {
    /// Creates a configuration for `url` with default prefix and timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: SecretString::from(url.into()),
            key_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
