//! Cache backend trait and statistics.
//!
//! Backends store opaque serialised payloads under string keys with a TTL.
//! Typed access, key construction and error absorption live in
//! [`CacheStore`](super::CacheStore).

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by cache backends. Never surfaced past the cache store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cache payload could not be (de)serialised: {0}")]
    Serialization(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be safe for concurrent use and must never return
/// an entry past its expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Get a live value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value, overwriting any previous entry and resetting its expiry.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove one key. Returns the number of entries removed.
    async fn delete(&self, key: &str) -> Result<u64, CacheError>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, degraded reads included.
    pub misses: u64,
    /// Number of successful writes.
    pub writes: u64,
    /// Number of entries removed by invalidation.
    pub invalidations: u64,
    /// Number of backend errors absorbed.
    pub errors: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
