//! Backing stores.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::key::CacheKey;

/// Errors from a single backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// One tier of the layered cache.
///
/// Values are opaque byte sequences; the bundler owns their encoding.
/// Stores must tolerate concurrent `get`/`set` calls on distinct keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in log labels and write-failure reports.
    fn name(&self) -> &str;

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<(), StoreError>;
}

/// Unbounded in-memory store, the usual first tier.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<FxHashMap<CacheKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "MemoryStore"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(*key, value.to_vec());
        Ok(())
    }
}

/// Local disk store.
///
/// Entries live at `<root>/<first two hex chars>/<full hex key>`; the two-char
/// shard keeps directory fan-out bounded. Writes go through a temp file and a
/// rename so a crashed process never leaves a torn entry behind.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Remove the whole store directory; used by `resetCache`.
    pub async fn wipe(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2]).join(&hex)
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    fn name(&self) -> &str {
        "DiskStore"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &CacheKey, value: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let dir = path.parent().expect("entry path always has a shard dir");
        tokio::fs::create_dir_all(dir).await?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(byte: u8) -> CacheKey {
        CacheKey::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&key(1)).await.unwrap(), None);

        store.set(&key(1), b"artifact").await.unwrap();
        assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"artifact".to_vec()));
    }

    #[tokio::test]
    async fn disk_store_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());

        assert_eq!(store.get(&key(2)).await.unwrap(), None);
        store.set(&key(2), b"bytes").await.unwrap();
        assert_eq!(store.get(&key(2)).await.unwrap(), Some(b"bytes".to_vec()));
    }

    #[tokio::test]
    async fn disk_store_shards_by_hex_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());
        let k = key(0xab);

        store.set(&k, b"x").await.unwrap();

        let expected = tmp.path().join("ab").join(k.to_hex());
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn disk_store_wipe_clears_entries() {
        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path().join("cache"));

        store.set(&key(3), b"x").await.unwrap();
        store.wipe().await.unwrap();
        assert_eq!(store.get(&key(3)).await.unwrap(), None);

        // Wiping a missing directory is fine.
        store.wipe().await.unwrap();
    }
}
