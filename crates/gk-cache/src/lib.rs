//! Gatekeeper cache facade.
//!
//! A uniform get/set/del/upsert contract with TTL over two interchangeable
//! backends, plus a factory that selects the primary backend from
//! configuration and always exposes a separate in-process cache for secrets.
//!
//! # Modules
//!
//! - `backend` - The `CacheBackend` trait and typed `CacheExt` helpers
//! - `errors` - Error types
//! - `factory` - `CacheFactory` and backend selection
//! - `local` - In-process backend with lazy expiry
//! - `metrics` - Cache operation counters
//! - `remote` - Redis backend with key namespacing and timeouts

pub mod backend;
pub mod errors;
pub mod factory;
pub mod local;
pub mod metrics;
pub mod remote;

mod single_flight;

pub use backend::{supplier_fn, CacheBackend, CacheExt, Supplier, SupplierFuture};
pub use errors::CacheError;
pub use factory::{CacheConfig, CacheFactory, CacheMethod};
pub use local::LocalCache;
pub use remote::RedisCache;
