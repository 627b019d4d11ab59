//! Per-key gates that let exactly one caller populate a missing entry.
//!
//! A caller takes the gate for its key, re-checks the cache under the gate,
//! and only then runs the supplier. Callers that queued on the same gate find
//! the stored value on their re-check.

use crate::backend::Supplier;
use crate::errors::CacheError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct InFlight<G> {
    gates: Mutex<HashMap<String, Arc<G>>>,
}

impl<G: Default> InFlight<G> {
    pub(crate) fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Gate shared by every caller currently populating `key`.
    pub(crate) fn gate(&self, key: &str) -> Arc<G> {
        let mut gates = self.gates.lock();
        Arc::clone(gates.entry(key.to_string()).or_default())
    }

    /// Drop the gate for `key` once population finished. Callers already
    /// holding a clone keep it alive until they are done.
    pub(crate) fn release(&self, key: &str, gate: &Arc<G>) {
        let mut gates = self.gates.lock();
        if gates.get(key).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            gates.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.gates.lock().len()
    }
}

/// Run an async supplier, bounded by `limit`.
pub(crate) async fn populate(supplier: Supplier, limit: Duration) -> Result<Value, CacheError> {
    tokio::time::timeout(limit, supplier())
        .await
        .map_err(|_| CacheError::Timeout(limit))?
}

/// Wait for the async gate, bounded by `limit`.
pub(crate) async fn acquire(
    gate: &tokio::sync::Mutex<()>,
    limit: Duration,
) -> Result<tokio::sync::MutexGuard<'_, ()>, CacheError> {
    tokio::time::timeout(limit, gate.lock())
        .await
        .map_err(|_| CacheError::Timeout(limit))
}
