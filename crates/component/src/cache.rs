// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTL key-value cache port and the default in-memory adapter.
//!
//! Entries are keyed by [`CacheKey`] (tenant + stage). The entry's own TTL is
//! the only expiry mechanism; callers never inspect token age themselves.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Credential stage a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PlatformAccessToken,
    AuthorizerToken,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlatformAccessToken => "component_access_token",
            Self::AuthorizerToken => "authorizer_access_token",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key: one slot per (tenant, stage).
///
/// Compared structurally, so a tenant id containing `_` can never alias
/// another tenant's slot. [`fmt::Display`] renders `<stage>_<tenant>` for
/// string-keyed backing stores; stage prefixes are fixed and distinct, and
/// the tenant id is always the whole suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant: String,
    pub stage: Stage,
}

impl CacheKey {
    pub fn new(tenant: impl Into<String>, stage: Stage) -> Self {
        Self { tenant: tenant.into(), stage }
    }

    pub fn platform(tenant: &str) -> Self {
        Self::new(tenant, Stage::PlatformAccessToken)
    }

    pub fn authorizer(tenant: &str) -> Self {
        Self::new(tenant, Stage::AuthorizerToken)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.stage, self.tenant)
    }
}

/// TTL key-value store shared by every tenant.
///
/// Object-safe for use as `Arc<dyn TokenCache>`. Implementations must be
/// safe for concurrent readers and writers; the last write wins.
pub trait TokenCache: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, anyhow::Result<Option<String>>>;

    fn put<'a>(
        &'a self,
        key: &'a CacheKey,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    fn remove<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, anyhow::Result<()>>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry.
    pub async fn ttl(&self, key: &CacheKey) -> Option<Duration> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let now = Instant::now();
        if entry.expires_at > now {
            Some(entry.expires_at - now)
        } else {
            None
        }
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

impl TokenCache for MemoryCache {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, anyhow::Result<Option<String>>> {
        Box::pin(async move {
            {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    Some(e) if e.expires_at > Instant::now() => return Ok(Some(e.value.clone())),
                    Some(_) => {}
                    None => return Ok(None),
                }
            }
            // Expired: drop it unless a writer replaced it meanwhile.
            let mut entries = self.entries.write().await;
            if entries.get(key).is_some_and(|e| e.expires_at <= Instant::now()) {
                entries.remove(key);
            }
            Ok(None)
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a CacheKey,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let expires_at = Instant::now() + ttl;
            self.entries.write().await.insert(key.clone(), Entry { value, expires_at });
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.entries.write().await.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
