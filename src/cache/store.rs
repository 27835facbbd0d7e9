//! Key-value backends behind the read-through cache.
//!
//! The cache treats its backend as a remote, fallible service: every call
//! may fail and the caller decides how to degrade.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT: &str = "showcase_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheBackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected `{op}`: {reason}")]
    Rejected { op: &'static str, reason: String },
}

impl CacheBackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// A shared key-value store holding serialized entries with a TTL.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheBackendError>;

    /// Remove every key starting with `prefix` in one batch, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheBackendError>;
}

struct StoredEntry {
    value: String,
    expires_at: Instant,
}

/// In-process backend with LRU eviction and per-entry expiry.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheBackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
        };

        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheBackendError> {
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            CacheBackendError::Rejected {
                op: "set",
                reason: format!("ttl {ttl:?} overflows the clock"),
            }
        })?;

        let evicted = rw_write(&self.entries, SOURCE, "set")
            .push(key.to_string(), StoredEntry { value, expires_at });
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheBackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_prefix");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = store(8);
        store
            .set("hero:home", "{}".to_string(), Duration::from_secs(60))
            .await
            .expect("set");

        let value = store.get("hero:home").await.expect("get");
        assert_eq!(value.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let store = store(8);
        store
            .set("campaigns:active", "[]".to_string(), Duration::from_millis(10))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get("campaigns:active").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let store = store(8);
        let ttl = Duration::from_secs(60);
        for key in ["hero:a", "hero:b", "heroes:c", "sections:homepage"] {
            store.set(key, "1".to_string(), ttl).await.expect("set");
        }

        let removed = store.delete_prefix("hero:").await.expect("delete");
        assert_eq!(removed, 2);
        assert!(store.get("heroes:c").await.expect("get").is_some());
        assert!(store.get("sections:homepage").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn lru_eviction() {
        let store = store(2);
        let ttl = Duration::from_secs(60);
        store.set("a", "1".to_string(), ttl).await.expect("set");
        store.set("b", "2".to_string(), ttl).await.expect("set");
        store.set("c", "3".to_string(), ttl).await.expect("set");

        assert!(store.get("a").await.expect("get").is_none());
        assert!(store.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let store = store(4);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store
            .set("ui-text:en", "{}".to_string(), Duration::from_secs(60))
            .await
            .expect("set after poison");
        assert_eq!(store.len(), 1);
    }
}
