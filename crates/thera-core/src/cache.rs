//! Response caching keyed by request fingerprint.
//!
//! [`CacheStore`] fronts one of two backends: the persisted DuckDB
//! [`ResponseCache`] or an in-process map. Both treat an entry past its expiry
//! as a miss even before [`CacheStore::cleanup_expired`] purges it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thera_cache::{now_millis, CacheConfig, CacheError, ResponseCache};
use thiserror::Error;

pub use thera_cache::CacheStats;

use crate::fingerprint::RequestFingerprint;

/// Cache I/O failure. Callers degrade to a miss (read) or skip the write.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache backend error: {0}")]
    Backend(#[from] CacheError),

    #[error("cache worker failed: {0}")]
    Worker(String),
}

type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Storage contract behind [`CacheStore`].
pub trait CacheBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, payload: String, ttl: Duration) -> StorageFuture<'a, ()>;

    fn cleanup_expired(&self) -> StorageFuture<'_, usize>;

    fn stats(&self) -> StorageFuture<'_, CacheStats>;

    fn clear(&self) -> StorageFuture<'_, ()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: String,
    created_at: i64,
    expires_at: i64,
}

/// Thread-safe in-process cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<tokio::sync::RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = now_millis();
            let map = self.inner.read().await;
            Ok(map
                .get(key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.payload.clone()))
        })
    }

    fn set<'a>(&'a self, key: &'a str, payload: String, ttl: Duration) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            if ttl_ms == 0 {
                return Ok(());
            }
            let created_at = now_millis();
            let entry = MemoryEntry {
                payload,
                created_at,
                expires_at: created_at.saturating_add(ttl_ms),
            };
            self.inner.write().await.insert(key.to_owned(), entry);
            Ok(())
        })
    }

    fn cleanup_expired(&self) -> StorageFuture<'_, usize> {
        Box::pin(async move {
            let now = now_millis();
            let mut map = self.inner.write().await;
            let before = map.len();
            map.retain(|_, entry| entry.expires_at > now);
            Ok(before - map.len())
        })
    }

    fn stats(&self) -> StorageFuture<'_, CacheStats> {
        Box::pin(async move {
            let now = now_millis();
            let map = self.inner.read().await;
            let total = map.len() as u64;
            let expired = map.values().filter(|entry| entry.expires_at <= now).count() as u64;
            debug_assert!(map.values().all(|entry| entry.expires_at > entry.created_at));
            Ok(CacheStats {
                total,
                expired,
                active: total - expired,
            })
        })
    }

    fn clear(&self) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            self.inner.write().await.clear();
            Ok(())
        })
    }
}

/// DuckDB-backed cache; blocking database calls run on the blocking pool.
#[derive(Clone)]
pub struct PersistentCache {
    cache: ResponseCache,
}

impl PersistentCache {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }

    async fn run_blocking<T, F>(&self, operation: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(ResponseCache) -> Result<T, CacheError> + Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || operation(cache))
            .await
            .map_err(|error| StorageError::Worker(error.to_string()))?
            .map_err(StorageError::from)
    }
}

impl CacheBackend for PersistentCache {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        let key = key.to_owned();
        Box::pin(self.run_blocking(move |cache| cache.get(&key)))
    }

    fn set<'a>(&'a self, key: &'a str, payload: String, ttl: Duration) -> StorageFuture<'a, ()> {
        let key = key.to_owned();
        Box::pin(self.run_blocking(move |cache| cache.set(&key, &payload, ttl)))
    }

    fn cleanup_expired(&self) -> StorageFuture<'_, usize> {
        Box::pin(self.run_blocking(|cache| cache.cleanup_expired()))
    }

    fn stats(&self) -> StorageFuture<'_, CacheStats> {
        Box::pin(self.run_blocking(|cache| cache.stats()))
    }

    fn clear(&self) -> StorageFuture<'_, ()> {
        Box::pin(self.run_blocking(|cache| cache.clear()))
    }
}

/// Fingerprint-keyed TTL cache shared by the gateway.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// In-process cache that lives as long as the store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Open (or create) the persisted cache described by `config`.
    pub fn open(config: CacheConfig) -> Result<Self, StorageError> {
        let cache = ResponseCache::open(config)?;
        Ok(Self::persistent(cache))
    }

    pub fn persistent(cache: ResponseCache) -> Self {
        Self::new(Arc::new(PersistentCache::new(cache)))
    }

    pub async fn get(&self, fingerprint: &RequestFingerprint) -> Result<Option<String>, StorageError> {
        self.backend.get(fingerprint.as_str()).await
    }

    /// Upsert `payload` for `ttl`; a zero TTL stores nothing.
    pub async fn set(
        &self,
        fingerprint: &RequestFingerprint,
        payload: String,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.backend.set(fingerprint.as_str(), payload, ttl).await
    }

    pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
        self.backend.cleanup_expired().await
    }

    pub async fn stats(&self) -> Result<CacheStats, StorageError> {
        self.backend.stats().await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.backend.clear().await
    }
}
