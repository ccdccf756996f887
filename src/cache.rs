//! Process-local response cache for model calls.
//!
//! Identical extraction requests (same documents, same model, same
//! instruction) are answered from memory for a bounded time window instead of
//! being billed twice. The cache is a value the caller owns and injects into
//! [`crate::ContractPipeline`]; there is no module-level singleton, so tests
//! never share cached state.
//!
//! Lookups go through moka's `try_get_with`: while one request for a key is
//! in flight, concurrent requests for the same key wait for it and share its
//! result instead of issuing their own upstream call. Errors are handed to
//! every waiter but never stored.

use crate::error::ContractFillError;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Statistics for cache monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Approximate number of live entries.
    pub entry_count: u64,
}

/// Time-bounded, single-flight cache keyed by content hash.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone)]
pub struct ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Option<Cache<String, V>>,
}

impl<V> std::fmt::Debug for ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.inner.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Cache holding at most `max_capacity` entries, each for `ttl`.
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Some(
                Cache::builder()
                    .max_capacity(max_capacity)
                    .time_to_live(ttl)
                    .build(),
            ),
        }
    }

    /// A cache that never stores anything; every lookup runs its initialiser.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Build from `cache_ttl_secs` / `cache_capacity`.
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        match config.cache_ttl() {
            Some(ttl) => Self::new(config.cache_capacity, ttl),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Return the cached value for `key`, or run `init` and cache its `Ok`
    /// result. Concurrent calls for the same key share one `init` run.
    pub async fn get_or_try_insert_with<F>(&self, key: String, init: F) -> Result<V, ContractFillError>
    where
        F: Future<Output = Result<V, ContractFillError>>,
    {
        let Some(cache) = &self.inner else {
            return init.await;
        };

        if let Some(hit) = cache.get(&key).await {
            debug!("Cache hit: {}", short(&key));
            return Ok(hit);
        }

        debug!("Cache miss: {}", short(&key));
        cache
            .try_get_with(key, init)
            .await
            .map_err(|shared: Arc<ContractFillError>| (*shared).clone())
    }

    /// Cached value for `key`, if present and not expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.as_ref().map_or(0, |c| c.entry_count()),
        }
    }
}

/// Hex SHA-256 over `parts`, each prefixed with its length so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn content_hash<I, P>(parts: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
