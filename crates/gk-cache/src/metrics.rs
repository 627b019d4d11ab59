//! Metrics for cache operations.
//!
//! Metric: `gk_cache_operations_total`
//! Labels: `backend` (local, secrets, redis), `operation` (get, set, del,
//! upsert), `outcome` (hit, miss, ok, populated, error, timeout)
//!
//! All label values are static strings, so cardinality is bounded by code.

use metrics::counter;

/// Record a single cache operation and its outcome.
pub fn record_cache_operation(backend: &'static str, operation: &'static str, outcome: &'static str) {
    counter!(
        "gk_cache_operations_total",
        "backend" => backend,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
