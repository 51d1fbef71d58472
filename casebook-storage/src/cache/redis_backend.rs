//! Redis-backed cache implementation.
//!
//! The connection is established lazily on first use and then shared
//! through a [`ConnectionManager`], which reconnects on its own. There is no
//! per-call health probe: a failing command surfaces as a [`CacheError`]
//! that the cache store absorbs. Every command is bounded by a timeout so an
//! unreachable server degrades to a miss instead of stalling the caller.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue};
use tokio::sync::OnceCell;

use super::traits::{CacheBackend, CacheError};

/// Keys fetched per SCAN round trip during prefix deletes.
const SCAN_BATCH: usize = 200;

/// Redis [`CacheBackend`].
pub struct RedisCacheBackend {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend")
            .field("connected", &self.connection.initialized())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCacheBackend {
    /// Parse the URL; no connection is made until the first command.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_millis(500),
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let connect = || async {
            match tokio::time::timeout(
                self.connect_timeout,
                ConnectionManager::new(self.client.clone()),
            )
            .await
            {
                Ok(Ok(manager)) => Ok(manager),
                Ok(Err(e)) => Err(CacheError::Connection(e.to_string())),
                Err(_) => Err(CacheError::Timeout(self.connect_timeout)),
            }
        };
        self.connection.get_or_try_init(connect).await.cloned()
    }

    async fn query<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T, CacheError> {
        let mut connection = self.connection().await?;
        match tokio::time::timeout(self.command_timeout, cmd.query_async::<_, T>(&mut connection))
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Command(e.to_string())),
            Err(_) => Err(CacheError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        // PX 0 is rejected by the server
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis);
        self.query(cmd).await
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, keys): (u64, Vec<String>) = self.query(scan).await?;

            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                del.arg(&keys);
                removed += self.query::<u64>(del).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("cb:t1:"), "cb:t1:");
        assert_eq!(escape_glob("cb:a*b?[c]:"), "cb:a\\*b\\?\\[c\\]:");
    }

    #[test]
    fn test_open_rejects_malformed_url() {
        assert!(matches!(
            RedisCacheBackend::open("not a url"),
            Err(CacheError::Connection(_))
        ));
    }

    #[test]
    fn test_open_does_not_connect() {
        // nothing listens here; opening must still succeed
        let backend = RedisCacheBackend::open("redis://127.0.0.1:1").unwrap();
        assert!(!backend.connection.initialized());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let backend = RedisCacheBackend::open("redis://127.0.0.1:1")
            .unwrap()
            .with_connect_timeout(Duration::from_millis(200));
        let result = backend.get("cb:t1:tenant_stats:all").await;
        assert!(matches!(
            result,
            Err(CacheError::Connection(_)) | Err(CacheError::Timeout(_))
        ));
    }
}
