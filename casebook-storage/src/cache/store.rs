//! Cache store: typed, best-effort access to a cache backend.
//!
//! Backend failures (connection loss, corrupt payloads) are logged at `warn`
//! and degrade to a miss or a no-op; they never reach callers. Reads that go
//! through [`CacheStore::get_or_load`] therefore always fall back to the
//! loader, which keeps behaviour correct when no cache is reachable.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use casebook_core::{CacheConfig, CasebookError, CasebookResult, ConfigError, TenantId};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::key::{CacheKey, CacheStrategy, InvalidationTarget};
use super::memory::InMemoryCacheBackend;
use super::redis_backend::RedisCacheBackend;
use super::traits::{CacheBackend, CacheError, CacheStats};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Typed cache over a [`CacheBackend`] chosen once at construction.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// In-process cache with the default prefix.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryCacheBackend::new()),
            CacheConfig::default().key_prefix,
        )
    }

    /// Redis when a URL is configured, otherwise the in-process map.
    pub fn from_config(config: &CacheConfig) -> CasebookResult<Self> {
        config.validate()?;

        let backend: Arc<dyn CacheBackend> = match &config.redis_url {
            Some(url) => {
                let backend = RedisCacheBackend::open(url).map_err(|e| {
                    CasebookError::from(ConfigError::InvalidValue {
                        field: "CASEBOOK_REDIS_URL".to_string(),
                        value: url.clone(),
                        reason: e.to_string(),
                    })
                })?;
                Arc::new(backend)
            }
            None => Arc::new(InMemoryCacheBackend::new()),
        };

        info!(
            backend = backend.name(),
            prefix = %config.key_prefix,
            "Cache store initialized"
        );
        Ok(Self::new(backend, config.key_prefix.clone()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }

    /// Live cached value, or `None` on miss, expiry or backend failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let encoded = key.encode(&self.prefix);
        let raw = match self.backend.get(&encoded).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                Counters::bump(&self.counters.misses, 1);
                return None;
            }
            Err(e) => {
                self.degraded("get", &encoded, &e);
                Counters::bump(&self.counters.misses, 1);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                Counters::bump(&self.counters.hits, 1);
                Some(value)
            }
            Err(e) => {
                self.degraded("decode", &encoded, &CacheError::Serialization(e.to_string()));
                Counters::bump(&self.counters.misses, 1);
                // drop the unreadable payload so the next read reloads it
                if let Err(e) = self.backend.delete(&encoded).await {
                    self.degraded("delete", &encoded, &e);
                }
                None
            }
        }
    }

    /// Store a value with an explicit TTL. Best-effort.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let encoded = key.encode(&self.prefix);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.degraded("encode", &encoded, &CacheError::Serialization(e.to_string()));
                return;
            }
        };

        match self.backend.set(&encoded, payload, ttl).await {
            Ok(()) => Counters::bump(&self.counters.writes, 1),
            Err(e) => self.degraded("set", &encoded, &e),
        }
    }

    /// Store a value with the TTL of the key's strategy.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        self.set(key, value, key.ttl()).await;
    }

    /// Remove one key or every key under a prefix. Returns entries removed;
    /// zero when the backend failed.
    pub async fn invalidate(&self, target: impl Into<InvalidationTarget>) -> u64 {
        let target = target.into();
        let (what, result) = match (&target, target.prefix(&self.prefix)) {
            (InvalidationTarget::Key(key), _) => {
                let encoded = key.encode(&self.prefix);
                let result = self.backend.delete(&encoded).await;
                (encoded, result)
            }
            (_, Some(prefix)) => {
                let result = self.backend.delete_prefix(&prefix).await;
                (prefix, result)
            }
            (_, None) => return 0,
        };

        match result {
            Ok(removed) => {
                Counters::bump(&self.counters.invalidations, removed);
                debug!(target_key = %what, removed, "Cache invalidated");
                removed
            }
            Err(e) => {
                self.degraded("invalidate", &what, &e);
                0
            }
        }
    }

    /// Read-through: return the cached value or load, store and return it.
    /// Loader errors are returned unchanged and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Named strategies
    // ------------------------------------------------------------------------

    /// Read-through over a tenant's status counts.
    pub async fn tenant_stats_or_load<T, E, F, Fut>(
        &self,
        tenant_id: &TenantId,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_load(&CacheKey::tenant_stats(tenant_id), load)
            .await
    }

    pub async fn invalidate_tenant_stats(&self, tenant_id: &TenantId) -> u64 {
        self.invalidate(InvalidationTarget::TenantStrategy(
            tenant_id.clone(),
            CacheStrategy::TenantStats,
        ))
        .await
    }

    /// Read-through over a shared lookup catalog.
    pub async fn catalog_or_load<T, E, F, Fut>(&self, name: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_load(&CacheKey::catalog(name), load).await
    }

    fn degraded(&self, operation: &str, key: &str, error: &CacheError) {
        Counters::bump(&self.counters.errors, 1);
        warn!(
            backend = self.backend.name(),
            operation,
            key,
            error = %error,
            "Cache degraded, continuing without it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Stats {
        total: u64,
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Connection("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Connection("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<u64, CacheError> {
            Err(CacheError::Connection("connection refused".to_string()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
            Err(CacheError::Connection("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_set_then_get_and_expiry() {
        let cache = CacheStore::in_memory();
        let key = CacheKey::tenant_stats(&TenantId::new("t1"));

        cache.set(&key, &Stats { total: 3 }, Duration::from_millis(20)).await;
        assert_eq!(cache.get::<Stats>(&key).await, Some(Stats { total: 3 }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get::<Stats>(&key).await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_invalidate_tenant_leaves_others() {
        let cache = CacheStore::in_memory();
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");
        for (tenant, total) in [(&t1, 1), (&t2, 2)] {
            let loaded: Result<Stats, ()> = cache
                .tenant_stats_or_load(tenant, || async move { Ok(Stats { total }) })
                .await;
            assert_eq!(loaded, Ok(Stats { total }));
        }
        let catalog: Result<Vec<String>, ()> = cache
            .catalog_or_load("conduct_types", || async {
                Ok(vec!["a".to_string(), "b".to_string()])
            })
            .await;
        assert!(catalog.is_ok());

        assert_eq!(cache.invalidate(InvalidationTarget::Tenant(t1.clone())).await, 1);
        assert!(cache.get::<Stats>(&CacheKey::tenant_stats(&t1)).await.is_none());
        assert_eq!(
            cache.get::<Stats>(&CacheKey::tenant_stats(&t2)).await,
            Some(Stats { total: 2 })
        );

        // a hit never runs the loader
        let cached: Result<Vec<String>, ()> = cache
            .catalog_or_load("conduct_types", || async { Err(()) })
            .await;
        assert_eq!(cached, Ok(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let cache = CacheStore::in_memory();
        let key = CacheKey::catalog("courses");
        cache.put(&key, &vec![1, 2, 3]).await;
        assert_eq!(cache.invalidate(key.clone()).await, 1);
        assert!(cache.get::<Vec<i32>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_load_loads_once() {
        let cache = CacheStore::in_memory();
        let key = CacheKey::tenant_stats(&TenantId::new("t1"));
        let loads = AtomicUsize::new(0);
        let counter = &loads;

        for _ in 0..3 {
            let value: Result<Stats, String> = cache
                .get_or_load(&key, || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Stats { total: 7 })
                })
                .await;
            assert_eq!(value.unwrap(), Stats { total: 7 });
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let cache = CacheStore::in_memory();
        let key = CacheKey::catalog("x");
        let result: Result<Vec<String>, &str> =
            cache.get_or_load(&key, || async { Err("down") }).await;
        assert_eq!(result, Err("down"));
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_to_miss() {
        let cache = CacheStore::new(Arc::new(BrokenBackend), "cb");
        let key = CacheKey::tenant_stats(&TenantId::new("t1"));

        cache.put(&key, &Stats { total: 1 }).await;
        assert!(cache.get::<Stats>(&key).await.is_none());
        assert_eq!(cache.invalidate(InvalidationTarget::Tenant(TenantId::new("t1"))).await, 0);

        let loaded: Result<Stats, String> = cache
            .get_or_load(&key, || async { Ok(Stats { total: 9 }) })
            .await;
        assert_eq!(loaded.unwrap(), Stats { total: 9 });

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert!(stats.errors >= 4);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_dropped() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let cache = CacheStore::new(backend.clone(), "cb");
        let key = CacheKey::catalog("courses");
        backend
            .set(&key.encode("cb"), "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.get::<Vec<String>>(&key).await.is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_from_config_selects_backend() {
        let memory = CacheStore::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(memory.backend_name(), "memory");

        let redis = CacheStore::from_config(&CacheConfig {
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            ..CacheConfig::default()
        })
        .unwrap();
        assert_eq!(redis.backend_name(), "redis");
    }
}
