//! Read-through cache over a [`KvStore`].
//!
//! The cache is an accelerator, never a dependency: backend failures are
//! logged and degrade to misses or no-ops. Fetcher failures are returned to
//! the caller and never stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::store::{CacheBackendError, KvStore};

const METRIC_CACHE_HIT: &str = "showcase_cache_hit_total";
const METRIC_CACHE_MISS: &str = "showcase_cache_miss_total";
const METRIC_CACHE_BACKEND_ERROR: &str = "showcase_cache_backend_error_total";

/// How a read-through lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Fetched,
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub outcome: CacheOutcome,
}

impl<T> Cached<T> {
    pub fn is_hit(&self) -> bool {
        self.outcome == CacheOutcome::Hit
    }
}

pub struct ReadThroughCache {
    store: Arc<dyn KvStore>,
    namespace: String,
    enabled: bool,
    /// One async lock per key with a fetch in progress.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl ReadThroughCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            enabled: config.enabled,
            inflight: DashMap::new(),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.namespace)
        }
    }

    /// Cached value for `key`, or `None` on a miss, an undecodable entry or a backend failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let raw = match self.store.get(&self.namespaced(key)).await {
            Ok(raw) => raw?,
            Err(err) => {
                backend_failure("get", key, &err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "Cache value could not be serialized");
                return;
            }
        };

        if let Err(err) = self.store.set(&self.namespaced(key), raw, ttl).await {
            backend_failure("set", key, &err);
        }
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count removed,
    /// zero when the backend is unreachable.
    pub async fn delete(&self, prefix: &str) -> u64 {
        if !self.enabled {
            return 0;
        }

        match self.store.delete_prefix(&self.namespaced(prefix)).await {
            Ok(removed) => {
                debug!(prefix, removed, "Cache prefix invalidated");
                removed
            }
            Err(err) => {
                backend_failure("delete", prefix, &err);
                0
            }
        }
    }

    /// Get-or-compute: returns the cached value for `key`, otherwise runs `fetcher`
    /// and caches its success for `ttl`.
    pub async fn with_cache<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetch_through(key, ttl, fetcher)
            .await
            .map(|cached| cached.value)
    }

    /// Like [`with_cache`](Self::with_cache), also reporting whether the value was a hit.
    ///
    /// Concurrent misses on one key wait for the first fetch instead of
    /// running their own.
    pub async fn fetch_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(Cached {
                value,
                outcome: CacheOutcome::Hit,
            });
        }

        if !self.enabled {
            counter!(METRIC_CACHE_MISS).increment(1);
            return fetcher().await.map(fetched);
        }

        let slot = self.namespaced(key);
        let lock = Arc::clone(&self.inflight.entry(slot.clone()).or_default());
        let guard = lock.lock().await;

        if let Some(value) = self.get::<T>(key).await {
            drop(guard);
            self.release(&slot, lock);
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(Cached {
                value,
                outcome: CacheOutcome::Hit,
            });
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        let result = fetcher().await;
        if let Ok(value) = &result {
            self.set(key, value, ttl).await;
        }

        drop(guard);
        self.release(&slot, lock);
        result.map(fetched)
    }

    fn release(&self, slot: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.inflight
            .remove_if(slot, |_, entry| Arc::strong_count(entry) == 1);
    }
}

fn fetched<T>(value: T) -> Cached<T> {
    Cached {
        value,
        outcome: CacheOutcome::Fetched,
    }
}

fn backend_failure(op: &'static str, key: &str, err: &CacheBackendError) {
    counter!(METRIC_CACHE_BACKEND_ERROR, "op" => op).increment(1);
    warn!(op, key, error = %err, "Cache backend failure; continuing without cache");
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::store::MemoryStore;

    struct OfflineStore;

    #[async_trait]
    impl KvStore for OfflineStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheBackendError> {
            Err(CacheBackendError::unavailable("connection refused"))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheBackendError> {
            Err(CacheBackendError::unavailable("connection refused"))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<u64, CacheBackendError> {
            Err(CacheBackendError::unavailable("connection refused"))
        }
    }

    fn memory_cache() -> ReadThroughCache {
        let store = Arc::new(MemoryStore::new(NonZeroUsize::new(64).expect("capacity")));
        ReadThroughCache::new(&CacheConfig::default(), store)
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = memory_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, String> = cache
                .with_cache("campaigns:active", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetcher_errors_propagate_and_are_not_cached() {
        let cache = memory_cache();
        let calls = AtomicUsize::new(0);

        let first: Result<u32, String> = cache
            .with_cache("sections:homepage", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("database down".to_string())
            })
            .await;
        assert_eq!(first, Err("database down".to_string()));
        assert!(cache.get::<u32>("sections:homepage").await.is_none());

        let second: Result<u32, String> = cache
            .with_cache("sections:homepage", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(3)
            })
            .await;
        assert_eq!(second, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let cache = Arc::new(memory_cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .with_cache("category-stats:all", TTL, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(vec![1, 2, 3])
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.expect("task joined");
            assert_eq!(value, Ok(vec![1, 2, 3]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.is_empty());
    }

    #[tokio::test]
    async fn fetch_through_reports_outcome() {
        let cache = memory_cache();

        let first = cache
            .fetch_through("hero:home", TTL, || async { Ok::<_, String>("a".to_string()) })
            .await
            .expect("first");
        let second = cache
            .fetch_through("hero:home", TTL, || async { Ok::<_, String>("b".to_string()) })
            .await
            .expect("second");

        assert_eq!(first.outcome, CacheOutcome::Fetched);
        assert!(second.is_hit());
        assert_eq!(second.value, "a");
    }

    #[tokio::test]
    async fn delete_counts_removed_prefix_entries() {
        let cache = memory_cache();
        cache.set("hero:one", &1, TTL).await;
        cache.set("hero:two", &2, TTL).await;
        cache.set("sections:homepage", &3, TTL).await;

        assert_eq!(cache.delete("hero:").await, 2);
        assert!(cache.get::<u32>("hero:one").await.is_none());
        assert_eq!(cache.get::<u32>("sections:homepage").await, Some(3));
    }

    #[tokio::test]
    async fn offline_backend_degrades_to_pass_through() {
        let cache = ReadThroughCache::new(&CacheConfig::default(), Arc::new(OfflineStore));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, String> = cache
                .with_cache("campaigns:active", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(5)
                })
                .await;
            assert_eq!(value, Ok(5));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.delete("campaigns:").await, 0);
        assert!(cache.get::<u32>("campaigns:active").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_stores() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new(NonZeroUsize::new(8).expect("capacity")));
        let cache = ReadThroughCache::new(&config, store.clone());

        cache.set("hero:home", &1, TTL).await;
        assert!(store.is_empty());
        assert!(cache.get::<u32>("hero:home").await.is_none());
    }

    #[tokio::test]
    async fn keys_are_namespaced_in_the_backend() {
        let store = Arc::new(MemoryStore::new(NonZeroUsize::new(8).expect("capacity")));
        let cache = ReadThroughCache::new(&CacheConfig::default(), store.clone());

        cache.set("hero:home", &1, TTL).await;
        assert_eq!(
            store.get("showcase:hero:home").await.expect("get").as_deref(),
            Some("1")
        );
    }
}
