//! In-process cache backend.
//!
//! Entries live in a `HashMap` behind a mutex. Expiry is checked lazily on
//! read: an expired entry is removed and reported as a miss, whether or not
//! [`LocalCache::purge_expired`] has run.
//!
//! The synchronous API (`get`, `set`, `del`, `upsert`) never suspends and is
//! what the token authenticator uses for key material. `LocalCache<Value>`
//! additionally implements [`CacheBackend`] so it can serve as the primary
//! backend.

use crate::backend::{CacheBackend, Supplier};
use crate::errors::CacheError;
use crate::metrics::record_cache_operation;
use crate::single_flight::{acquire, populate, InFlight};
use async_trait::async_trait;
use common::config::DEFAULT_POPULATION_TIMEOUT;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// `None` or a zero TTL means "never expires". So does a TTL too large to
/// represent as an instant.
fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|ttl| !ttl.is_zero())
        .and_then(|ttl| Instant::now().checked_add(ttl))
}

/// In-process key-value cache with per-entry TTL.
pub struct LocalCache<V> {
    label: &'static str,
    entries: Mutex<HashMap<String, Entry<V>>>,
    sync_flights: InFlight<Mutex<()>>,
    async_flights: InFlight<tokio::sync::Mutex<()>>,
    population_timeout: Duration,
}

impl<V> fmt::Debug for LocalCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("label", &self.label)
            .field("entries", &self.entries.lock().len())
            .field("population_timeout", &self.population_timeout)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Default for LocalCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> LocalCache<V> {
    /// Create an empty cache labelled `local`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("local")
    }

    /// Create an empty cache with a custom label for logs and metrics.
    #[must_use]
    pub fn named(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(HashMap::new()),
            sync_flights: InFlight::new(),
            async_flights: InFlight::new(),
            population_timeout: DEFAULT_POPULATION_TIMEOUT,
        }
    }

    /// Bound how long async `upsert` suppliers (and callers waiting on them)
    /// may run.
    #[must_use]
    pub fn with_population_timeout(mut self, timeout: Duration) -> Self {
        self.population_timeout = timeout;
        self
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Get a value, or `None` on a miss or an expired entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(Instant::now()),
        };

        if expired {
            entries.remove(key);
            return None;
        }

        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, overwriting any existing entry.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: deadline(ttl),
            },
        );
    }

    /// Remove an entry. Missing keys are ignored.
    pub fn del(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Return the cached value or populate it with `supplier`.
    ///
    /// Concurrent callers on the same key block on a per-key gate, so the
    /// supplier runs once; the others return the value it stored. If the
    /// supplier fails nothing is stored and the error goes to that caller
    /// only.
    ///
    /// # Errors
    ///
    /// Returns the supplier's error when the entry was missing and
    /// population failed.
    pub fn upsert<F, E>(&self, key: &str, supplier: F, ttl: Option<Duration>) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            record_cache_operation(self.label, "upsert", "hit");
            return Ok(value);
        }

        let gate = self.sync_flights.gate(key);
        let result = {
            let _guard = gate.lock();
            match self.get(key) {
                Some(value) => {
                    record_cache_operation(self.label, "upsert", "hit");
                    Ok(value)
                }
                None => {
                    debug!(target: "gk.cache.local", cache = self.label, key = %key, "Cache miss, populating entry");
                    let populated = supplier();
                    match &populated {
                        Ok(value) => {
                            self.set(key, value.clone(), ttl);
                            record_cache_operation(self.label, "upsert", "populated");
                        }
                        Err(_) => record_cache_operation(self.label, "upsert", "error"),
                    }
                    populated
                }
            }
        };
        self.sync_flights.release(key, &gate);

        result
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheBackend for LocalCache<Value> {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let value = LocalCache::get(self, key);
        record_cache_operation(self.label, "get", if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        LocalCache::set(self, key, value, ttl);
        record_cache_operation(self.label, "set", "ok");
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        LocalCache::del(self, key);
        record_cache_operation(self.label, "del", "ok");
        Ok(())
    }

    async fn upsert(
        &self,
        key: &str,
        supplier: Supplier,
        ttl: Option<Duration>,
    ) -> Result<Value, CacheError> {
        if let Some(value) = LocalCache::get(self, key) {
            record_cache_operation(self.label, "upsert", "hit");
            return Ok(value);
        }

        let gate = self.async_flights.gate(key);
        let result: Result<Value, CacheError> = async {
            let _guard = acquire(&gate, self.population_timeout).await?;

            if let Some(value) = LocalCache::get(self, key) {
                record_cache_operation(self.label, "upsert", "hit");
                return Ok(value);
            }

            debug!(target: "gk.cache.local", cache = self.label, key = %key, "Cache miss, populating entry");
            let value = populate(supplier, self.population_timeout)
                .await
                .inspect_err(|_| record_cache_operation(self.label, "upsert", "error"))?;

            LocalCache::set(self, key, value.clone(), ttl);
            record_cache_operation(self.label, "upsert", "populated");
            Ok::<_, CacheError>(value)
        }
        .await;
        self.async_flights.release(key, &gate);

        result
    }
}
