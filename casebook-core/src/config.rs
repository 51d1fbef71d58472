//! Configuration types
//!
//! Every section has a `Default`, a `from_env()` constructor reading
//! `CASEBOOK_*` variables, and a `validate()` pass. `from_vars` takes an
//! arbitrary lookup so configuration can be built without touching the
//! process environment.

use crate::{CasebookError, CasebookResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for store round trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one
    pub retries: u32,
    /// Base backoff; attempt `n` waits `delay * n`
    pub delay: Duration,
    /// Deadline for a single attempt
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_millis(300),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    /// Upper bound on configurable retries.
    pub const MAX_RETRIES: u32 = 10;

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            retries: parse_var(&lookup, "CASEBOOK_RETRIES").unwrap_or(defaults.retries),
            delay: parse_var(&lookup, "CASEBOOK_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            timeout: parse_var(&lookup, "CASEBOOK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(env_lookup)
    }

    pub fn validate(&self) -> CasebookResult<()> {
        if self.retries > Self::MAX_RETRIES {
            return Err(invalid(
                "CASEBOOK_RETRIES",
                self.retries.to_string(),
                format!("retries must be at most {}", Self::MAX_RETRIES),
            ));
        }

        if self.timeout.is_zero() {
            return Err(invalid(
                "CASEBOOK_TIMEOUT_MS",
                format!("{:?}", self.timeout),
                "timeout must be positive",
            ));
        }

        if self.delay > Duration::from_secs(60) {
            return Err(invalid(
                "CASEBOOK_RETRY_DELAY_MS",
                format!("{:?}", self.delay),
                "delay must not exceed 60s",
            ));
        }

        Ok(())
    }
}

/// Connection settings for the remote relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store's REST endpoint
    pub url: String,
    /// Project API key sent alongside the bearer credential
    pub api_key: Option<String>,
    /// Schema profile requested from the store
    pub schema: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: None,
            schema: "public".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: non_empty_var(&lookup, "CASEBOOK_STORE_URL").unwrap_or(defaults.url),
            api_key: non_empty_var(&lookup, "CASEBOOK_STORE_API_KEY"),
            schema: non_empty_var(&lookup, "CASEBOOK_STORE_SCHEMA").unwrap_or(defaults.schema),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(env_lookup)
    }

    pub fn validate(&self) -> CasebookResult<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid(
                "CASEBOOK_STORE_URL",
                self.url.clone(),
                "must be an http(s) URL",
            ));
        }
        Ok(())
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL; when absent the in-process cache is used
    pub redis_url: Option<String>,
    /// Prefix prepended to every key
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "cb".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            redis_url: non_empty_var(&lookup, "CASEBOOK_REDIS_URL"),
            key_prefix: non_empty_var(&lookup, "CASEBOOK_CACHE_PREFIX")
                .unwrap_or(defaults.key_prefix),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(env_lookup)
    }

    pub fn validate(&self) -> CasebookResult<()> {
        if let Some(url) = &self.redis_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(invalid(
                    "CASEBOOK_REDIS_URL",
                    url.clone(),
                    "must be a redis:// or rediss:// URL",
                ));
            }
        }
        if self.key_prefix.contains(':') {
            return Err(invalid(
                "CASEBOOK_CACHE_PREFIX",
                self.key_prefix.clone(),
                "prefix must not contain ':'",
            ));
        }
        Ok(())
    }
}

/// Diagnostic channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Outbound webhook receiving diagnostics, if any
    pub webhook_url: Option<String>,
}

impl MonitorConfig {
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            webhook_url: non_empty_var(&lookup, "CASEBOOK_MONITOR_URL"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(env_lookup)
    }

    pub fn validate(&self) -> CasebookResult<()> {
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "CASEBOOK_MONITOR_URL",
                    url.clone(),
                    "must be an http(s) URL",
                ));
            }
        }
        Ok(())
    }
}

/// Master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CasebookConfig {
    pub store: StoreConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub monitor: MonitorConfig,
}

impl CasebookConfig {
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            store: StoreConfig::from_vars(&lookup),
            retry: RetryConfig::from_vars(&lookup),
            cache: CacheConfig::from_vars(&lookup),
            monitor: MonitorConfig::from_vars(&lookup),
        }
    }

    /// Load every section from `CASEBOOK_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(env_lookup)
    }

    /// Validate all sections, reporting the first failure.
    pub fn validate(&self) -> CasebookResult<()> {
        self.store.validate()?;
        self.retry.validate()?;
        self.cache.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn non_empty_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    non_empty_var(lookup, key).and_then(|v| v.parse().ok())
}

fn invalid(field: &str, value: impl Into<String>, reason: impl Into<String>) -> CasebookError {
    CasebookError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CasebookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.retries, 2);
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn test_from_vars_reads_every_section() {
        let config = CasebookConfig::from_vars(lookup(&[
            ("CASEBOOK_STORE_URL", "https://db.example.org"),
            ("CASEBOOK_STORE_API_KEY", "anon"),
            ("CASEBOOK_RETRIES", "4"),
            ("CASEBOOK_RETRY_DELAY_MS", "50"),
            ("CASEBOOK_TIMEOUT_MS", "2000"),
            ("CASEBOOK_REDIS_URL", "redis://cache:6379"),
            ("CASEBOOK_MONITOR_URL", "https://hooks.example.org/x"),
        ]));

        assert_eq!(config.store.url, "https://db.example.org");
        assert_eq!(config.store.api_key.as_deref(), Some("anon"));
        assert_eq!(config.retry.retries, 4);
        assert_eq!(config.retry.delay, Duration::from_millis(50));
        assert_eq!(config.retry.timeout, Duration::from_millis(2000));
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.monitor.webhook_url.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_redis_url_means_in_process_cache() {
        let config = CacheConfig::from_vars(lookup(&[("CASEBOOK_REDIS_URL", "  ")]));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_unparseable_numbers_fall_back_to_defaults() {
        let config = RetryConfig::from_vars(lookup(&[("CASEBOOK_RETRIES", "many")]));
        assert_eq!(config.retries, RetryConfig::default().retries);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = RetryConfig {
            timeout: Duration::ZERO,
            ..RetryConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CasebookError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_bad_urls_are_rejected() {
        let cache = CacheConfig {
            redis_url: Some("http://cache".to_string()),
            ..CacheConfig::default()
        };
        assert!(cache.validate().is_err());

        let store = StoreConfig {
            url: "db.example.org".to_string(),
            ..StoreConfig::default()
        };
        assert!(store.validate().is_err());
    }
}
