//! In-process cache backend.
//!
//! A concurrent map of `key -> (value, expiry)`. Expired entries are evicted
//! eagerly when read; [`InMemoryCacheBackend::purge_expired`] sweeps the rest.
//! Concurrent writers race with last-write-wins semantics.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`CacheBackend`] used when no external cache is configured.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, MemoryEntry>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones not yet evicted included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict every expired entry. Returns the number evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        // the read guard must be released before removing
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Command(format!("ttl out of range: {:?}", ttl)))?;
        self.entries
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        Ok(u64::from(self.entries.remove(key).is_some()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let backend = InMemoryCacheBackend::new();
        backend
            .set("cb:t1:tenant_stats:all", "{\"total\":3}".to_string(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(
            backend.get("cb:t1:tenant_stats:all").await.unwrap().as_deref(),
            Some("{\"total\":3}")
        );
        assert!(backend.get("cb:t2:tenant_stats:all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let backend = InMemoryCacheBackend::new();
        backend
            .set("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_resets_expiry() {
        let backend = InMemoryCacheBackend::new();
        backend.set("k", "old".to_string(), Duration::from_millis(10)).await.unwrap();
        backend.set("k", "new".to_string(), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let backend = InMemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("cb:t1:tenant_stats:all", "1".to_string(), ttl).await.unwrap();
        backend.set("cb:t1:plazos:c1", "2".to_string(), ttl).await.unwrap();
        backend.set("cb:t2:plazos:c2", "3".to_string(), ttl).await.unwrap();

        assert_eq!(backend.delete_prefix("cb:t1:").await.unwrap(), 2);
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.delete("cb:t2:plazos:c2").await.unwrap(), 1);
        assert_eq!(backend.delete("cb:t2:plazos:c2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = InMemoryCacheBackend::new();
        backend.set("a", "1".to_string(), Duration::from_millis(5)).await.unwrap();
        backend.set("b", "2".to_string(), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }
}
