use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by cache backends.
///
/// `Unavailable` and `Timeout` describe the networked backend being
/// unreachable; callers can tell them apart from data errors with
/// [`CacheError::is_unavailable`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache population failed: {0}")]
    Supplier(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// True when the backend could not be reached in time.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_) | CacheError::Timeout(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
