//! Read-through / write-through orchestration over the store list.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::debug;

use crate::key::CacheKey;
use crate::store::{CacheStore, StoreError};

/// Errors from the layered cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A store failed during `get`. Fatal to the current request: a cache
    /// that cannot be read cannot be trusted for this build.
    #[error("cache read failed in store '{store}': {source}")]
    Read {
        store: String,
        #[source]
        source: StoreError,
    },

    /// One or more stores failed during `set`. The artifact made it into the
    /// stores not listed here; callers log this and proceed.
    #[error("cache write failed in {}", format_failures(.failures))]
    Write { failures: Vec<(String, StoreError)> },
}

fn format_failures(failures: &[(String, StoreError)]) -> String {
    failures
        .iter()
        .map(|(store, err)| format!("'{store}' ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordered list of backing stores with read-through semantics.
///
/// An empty store list disables caching: `get` always misses and `set` is a
/// no-op.
#[derive(Clone, Default)]
pub struct LayeredCache {
    stores: Vec<Arc<dyn CacheStore>>,
}

impl LayeredCache {
    pub fn new(stores: Vec<Arc<dyn CacheStore>>) -> Self {
        Self { stores }
    }

    pub fn is_disabled(&self) -> bool {
        self.stores.is_empty()
    }

    /// Try stores in order; on the first hit, back-fill every earlier store.
    ///
    /// Back-fill writes are fire-and-forget: their failures are ignored so a
    /// flaky fast tier cannot poison a good slow tier's hit.
    ///
    /// # Errors
    ///
    /// The first store `get` failure aborts the whole lookup.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        for (index, store) in self.stores.iter().enumerate() {
            debug!(label = %format!("{}::{key}", store.name()), "cache get start");
            let result = store.get(key).await.map_err(|source| CacheError::Read {
                store: store.name().to_string(),
                source,
            })?;

            match result {
                Some(value) => {
                    debug!(label = %format!("{}::{key}", store.name()), "cache get end (hit)");
                    for earlier in &self.stores[..index] {
                        let _ = earlier.set(key, &value).await;
                    }
                    return Ok(Some(value));
                }
                None => {
                    debug!(label = %format!("{}::{key}", store.name()), "cache get end (miss)");
                }
            }
        }
        Ok(None)
    }

    /// Write `value` to every store in parallel.
    ///
    /// # Errors
    ///
    /// `CacheError::Write` naming each failing store, with the individual
    /// causes preserved. Successful stores keep their writes.
    pub async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<(), CacheError> {
        if self.stores.is_empty() {
            return Ok(());
        }

        let writes = self.stores.iter().map(|store| {
            let label = store.name().to_string();
            async move {
                debug!(label = %format!("{label}::{key}"), "cache set start");
                let result = store.set(key, value).await;
                debug!(label = %format!("{label}::{key}"), "cache set end");
                (label, result)
            }
        });

        let failures: Vec<(String, StoreError)> = join_all(writes)
            .await
            .into_iter()
            .filter_map(|(label, result)| result.err().map(|err| (label, err)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Write { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(byte: u8) -> CacheKey {
        CacheKey::from_bytes([byte; 32])
    }

    /// Store with scripted behavior and call counters.
    struct ScriptedStore {
        name: &'static str,
        value: Option<Vec<u8>>,
        fail_get: bool,
        fail_set: bool,
        gets: AtomicUsize,
        sets: AtomicUsize,
    }

    impl ScriptedStore {
        fn hit(name: &'static str, value: &[u8]) -> Self {
            Self {
                name,
                value: Some(value.to_vec()),
                fail_get: false,
                fail_set: false,
                gets: AtomicUsize::new(0),
                sets: AtomicUsize::new(0),
            }
        }

        fn miss(name: &'static str) -> Self {
            Self {
                name,
                value: None,
                fail_get: false,
                fail_set: false,
                gets: AtomicUsize::new(0),
                sets: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStore for ScriptedStore {
        fn name(&self) -> &str {
            self.name
        }

        async fn get(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_get {
                return Err(StoreError::Other("scripted get failure".into()));
            }
            Ok(self.value.clone())
        }

        async fn set(&self, _key: &CacheKey, _value: &[u8]) -> Result<(), StoreError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                return Err(StoreError::Other("scripted set failure".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn hit_in_second_store_backfills_first_only() {
        let local = Arc::new(ScriptedStore::miss("Local"));
        let network = Arc::new(ScriptedStore::hit("Network", b"X"));
        let cache = LayeredCache::new(vec![local.clone(), network.clone()]);

        let value = cache.get(&key(1)).await.unwrap();
        assert_eq!(value, Some(b"X".to_vec()));

        // Local was back-filled exactly once; Network was never written.
        assert_eq!(local.sets.load(Ordering::SeqCst), 1);
        assert_eq!(network.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hit_in_first_store_skips_later_stores() {
        let local = Arc::new(ScriptedStore::hit("Local", b"V"));
        let network = Arc::new(ScriptedStore::miss("Network"));
        let cache = LayeredCache::new(vec![local.clone(), network.clone()]);

        cache.get(&key(1)).await.unwrap();
        assert_eq!(network.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_failure_is_fatal() {
        let mut broken = ScriptedStore::miss("Broken");
        broken.fail_get = true;
        let cache = LayeredCache::new(vec![Arc::new(broken)]);

        let err = cache.get(&key(1)).await.unwrap_err();
        assert!(matches!(err, CacheError::Read { store, .. } if store == "Broken"));
    }

    #[tokio::test]
    async fn set_writes_all_stores() {
        let a = Arc::new(MemoryStore::new());
        let b = Arc::new(MemoryStore::new());
        let cache = LayeredCache::new(vec![a.clone(), b.clone()]);

        cache.set(&key(1), b"artifact").await.unwrap();

        assert_eq!(a.get(&key(1)).await.unwrap(), Some(b"artifact".to_vec()));
        assert_eq!(b.get(&key(1)).await.unwrap(), Some(b"artifact".to_vec()));
    }

    #[tokio::test]
    async fn set_failures_are_aggregated_and_named() {
        let good = Arc::new(MemoryStore::new());
        let mut flaky = ScriptedStore::miss("Flaky");
        flaky.fail_set = true;
        let cache = LayeredCache::new(vec![good.clone(), Arc::new(flaky)]);

        let err = cache.set(&key(1), b"v").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Flaky"));

        // The healthy store kept its write.
        assert_eq!(good.get(&key(1)).await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = LayeredCache::default();
        assert!(cache.is_disabled());
        assert_eq!(cache.get(&key(1)).await.unwrap(), None);
        cache.set(&key(1), b"v").await.unwrap();
        assert_eq!(cache.get(&key(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_after_set_returns_the_value() {
        let cache = LayeredCache::new(vec![Arc::new(MemoryStore::new())]);
        cache.set(&key(9), b"artifact").await.unwrap();
        assert_eq!(cache.get(&key(9)).await.unwrap(), Some(b"artifact".to_vec()));
    }
}
