//! Cache storage.
//!
//! [`CacheStore`] is the key/value seam shared by every request. The
//! in-process [`MemoryCacheStore`] is an LRU with per-entry expiry; a shared
//! cache server can stand in behind the same trait.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::config::CacheConfig;
use super::lock;

const METRIC_CACHE_EVICT: &str = "loadcache_cache_evict_total";

/// One cached value with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    /// Expiry saturates at the latest representable instant.
    pub fn new(key: impl Into<String>, value: Value, ttl: Duration) -> Self {
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .unwrap_or(PrimitiveDateTime::MAX.assume_utc());
        Self {
            key: key.into(),
            value,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be encoded: {0}")]
    Encode(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Key/value cache with TTL.
///
/// Operations are independent per key: no multi-key transactions, racing
/// `set`s on one key resolve last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`, returning whether a live entry was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// In-process LRU cache store.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Peek without touching recency; expired entries count as absent.
    pub fn contains_key(&self, key: &str) -> bool {
        lock::read(&self.entries, "cache::store.contains_key")
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(OffsetDateTime::now_utc()))
    }

    pub fn len(&self) -> usize {
        lock::read(&self.entries, "cache::store.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock::write(&self.entries, "cache::store.clear").clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = lock::write(&self.entries, "cache::store.get");
        let now = OffsetDateTime::now_utc();
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, value, ttl);
        let evicted = lock::write(&self.entries, "cache::store.set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = lock::write(&self.entries, "cache::store.delete").pop(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired_at(OffsetDateTime::now_utc())))
    }
}
