//! Tenant-scoped cache keys.
//!
//! Keys encode as `{prefix}:{scope}:{strategy}:{discriminator}` where scope
//! is the tenant id or `shared`. Every tenant's entries share the
//! `{prefix}:{tenant}:` prefix, so a tenant (or one strategy of a tenant)
//! can be invalidated with a single prefix delete.

use casebook_core::TenantId;
use std::fmt;
use std::time::Duration;

const SHARED_SCOPE: &str = "shared";

/// Named caching strategy. Each fixes the TTL of one resource kind;
/// callers never pick arbitrary TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStrategy {
    /// Per-tenant case counts
    TenantStats,
    /// Shared lookup catalogs
    Catalog,
    /// Per-case deadline summaries
    PlazosSummary,
}

impl CacheStrategy {
    pub const ALL: [CacheStrategy; 3] = [
        CacheStrategy::TenantStats,
        CacheStrategy::Catalog,
        CacheStrategy::PlazosSummary,
    ];

    /// Key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::TenantStats => "tenant_stats",
            CacheStrategy::Catalog => "catalog",
            CacheStrategy::PlazosSummary => "plazos",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == segment)
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CacheStrategy::TenantStats => Duration::from_secs(30),
            CacheStrategy::Catalog => Duration::from_secs(10 * 60),
            CacheStrategy::PlazosSummary => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Tenant(TenantId),
    Shared,
}

/// A namespaced cache key.
///
/// The inner struct is private so keys can only be built through the
/// scoped constructors below.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    scope: CacheScope,
    strategy: CacheStrategy,
    discriminator: String,
}

impl CacheKey {
    /// Key owned by one tenant.
    pub fn tenant(
        tenant_id: &TenantId,
        strategy: CacheStrategy,
        discriminator: impl Into<String>,
    ) -> Self {
        Self {
            inner: CacheKeyInner {
                scope: CacheScope::Tenant(tenant_id.clone()),
                strategy,
                discriminator: discriminator.into(),
            },
        }
    }

    /// Key visible to every tenant.
    pub fn shared(strategy: CacheStrategy, discriminator: impl Into<String>) -> Self {
        Self {
            inner: CacheKeyInner {
                scope: CacheScope::Shared,
                strategy,
                discriminator: discriminator.into(),
            },
        }
    }

    pub fn tenant_stats(tenant_id: &TenantId) -> Self {
        Self::tenant(tenant_id, CacheStrategy::TenantStats, "all")
    }

    pub fn catalog(name: &str) -> Self {
        Self::shared(CacheStrategy::Catalog, name)
    }

    pub fn plazos(tenant_id: &TenantId, case_id: &str) -> Self {
        Self::tenant(tenant_id, CacheStrategy::PlazosSummary, case_id)
    }

    pub fn scope(&self) -> &CacheScope {
        &self.inner.scope
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.inner.strategy
    }

    pub fn discriminator(&self) -> &str {
        &self.inner.discriminator
    }

    pub fn ttl(&self) -> Duration {
        self.inner.strategy.ttl()
    }

    /// Encode with the configured prefix.
    pub fn encode(&self, prefix: &str) -> String {
        format!(
            "{}:{}:{}",
            scope_prefix(prefix, &self.inner.scope),
            self.inner.strategy.as_str(),
            escape(&self.inner.discriminator)
        )
    }

    /// Decode a key produced by [`CacheKey::encode`] with the same prefix.
    pub fn decode(prefix: &str, encoded: &str) -> Option<Self> {
        let rest = encoded.strip_prefix(prefix)?.strip_prefix(':')?;
        let mut parts = rest.splitn(3, ':');
        let scope = parts.next()?;
        let strategy = CacheStrategy::from_segment(parts.next()?)?;
        let discriminator = unescape(parts.next()?);

        Some(if scope == SHARED_SCOPE {
            Self::shared(strategy, discriminator)
        } else {
            Self::tenant(&TenantId::new(unescape(scope)), strategy, discriminator)
        })
    }
}

/// What to remove from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// One entry.
    Key(CacheKey),
    /// Every entry of a tenant.
    Tenant(TenantId),
    /// Every entry of one strategy for a tenant.
    TenantStrategy(TenantId, CacheStrategy),
    /// Every shared entry of one strategy.
    Shared(CacheStrategy),
}

impl InvalidationTarget {
    /// Prefix to delete, or `None` for an exact key.
    pub fn prefix(&self, prefix: &str) -> Option<String> {
        match self {
            InvalidationTarget::Key(_) => None,
            InvalidationTarget::Tenant(tenant) => Some(format!(
                "{}:",
                scope_prefix(prefix, &CacheScope::Tenant(tenant.clone()))
            )),
            InvalidationTarget::TenantStrategy(tenant, strategy) => Some(format!(
                "{}:{}:",
                scope_prefix(prefix, &CacheScope::Tenant(tenant.clone())),
                strategy.as_str()
            )),
            InvalidationTarget::Shared(strategy) => Some(format!(
                "{}:{}:",
                scope_prefix(prefix, &CacheScope::Shared),
                strategy.as_str()
            )),
        }
    }
}

impl From<CacheKey> for InvalidationTarget {
    fn from(key: CacheKey) -> Self {
        InvalidationTarget::Key(key)
    }
}

fn scope_prefix(prefix: &str, scope: &CacheScope) -> String {
    match scope {
        CacheScope::Shared => format!("{}:{}", prefix, SHARED_SCOPE),
        CacheScope::Tenant(tenant) => {
            let segment = escape(tenant.as_str());
            // a tenant literally named `shared` must not alias the shared scope
            if segment == SHARED_SCOPE {
                format!("{}:%73hared", prefix)
            } else {
                format!("{}:{}", prefix, segment)
            }
        }
    }
}

fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

fn unescape(segment: &str) -> String {
    segment
        .replace("%3A", ":")
        .replace("%73", "s")
        .replace("%25", "%")
}
