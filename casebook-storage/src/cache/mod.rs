//! Cache layer for aggregate reads.
//!
//! - [`CacheBackend`]: string key/value storage with TTL (Redis or in-process)
//! - [`CacheKey`] / [`CacheStrategy`]: tenant-namespaced keys with fixed TTLs
//! - [`CacheStore`]: typed, best-effort facade with read-through loading

mod key;
mod memory;
mod redis_backend;
mod store;
mod traits;

pub use key::{CacheKey, CacheScope, CacheStrategy, InvalidationTarget};
pub use memory::InMemoryCacheBackend;
pub use redis_backend::RedisCacheBackend;
pub use store::CacheStore;
pub use traits::{CacheBackend, CacheError, CacheStats};
