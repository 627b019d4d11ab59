//! The backend contract shared by every cache implementation.
//!
//! Values cross the trait as `serde_json::Value` so the networked backend can
//! serialize them; [`CacheExt`] layers typed helpers on top.

use crate::errors::CacheError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Future produced by an `upsert` supplier.
pub type SupplierFuture = BoxFuture<'static, Result<Value, CacheError>>;

/// Miss handler for [`CacheBackend::upsert`]. Invoked at most once per
/// population of a key.
pub type Supplier = Box<dyn FnOnce() -> SupplierFuture + Send>;

/// Uniform key-value contract with TTL.
///
/// A `ttl` of `None` or zero means the entry never expires. Reads of an
/// expired entry behave exactly like a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Get a value, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value, overwriting any existing entry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Return the cached value, or run `supplier`, store its result with
    /// `ttl` and return it.
    ///
    /// Concurrent callers for the same key share a single supplier run: the
    /// first caller populates, the rest wait and read the stored value. A
    /// failed supplier is not cached; the next waiter retries.
    async fn upsert(
        &self,
        key: &str,
        supplier: Supplier,
        ttl: Option<Duration>,
    ) -> Result<Value, CacheError>;
}

/// Typed helpers available on every [`CacheBackend`].
#[async_trait]
pub trait CacheExt: CacheBackend {
    /// Get and deserialize a value.
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value.
    async fn set_as<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await
    }

    /// Typed [`CacheBackend::upsert`].
    async fn upsert_as<T, F, Fut>(
        &self,
        key: &str,
        supplier: F,
        ttl: Option<Duration>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let supplier: Supplier = Box::new(move || {
            Box::pin(async move {
                let value = supplier().await?;
                Ok(serde_json::to_value(value)?)
            })
        });

        let value = self.upsert(key, supplier, ttl).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<B: CacheBackend + ?Sized> CacheExt for B {}

/// Wrap a synchronous closure as a [`Supplier`].
pub fn supplier_fn<F>(f: F) -> Supplier
where
    F: FnOnce() -> Result<Value, CacheError> + Send + 'static,
{
    Box::new(move || Box::pin(async move { f() }))
}
