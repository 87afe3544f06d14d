//! Cache storage abstraction and the in-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::network::Response;

/// A set of named key→response caches, as exposed by a browser's cache API.
///
/// Writes to the same key within one cache are last-write-wins. `put` on a
/// cache that was never opened creates it.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named cache, creating it if needed.
    async fn open(&self, cache: &str) -> Result<()>;

    /// Returns true if the named cache exists.
    async fn has(&self, cache: &str) -> Result<bool>;

    /// Deletes the named cache and all its entries. Returns false if absent.
    async fn delete(&self, cache: &str) -> Result<bool>;

    /// Lists the request keys stored in the named cache, sorted.
    async fn keys(&self, cache: &str) -> Result<Vec<String>>;

    /// Looks up an entry.
    async fn get(&self, cache: &str, key: &str) -> Result<Option<Response>>;

    /// Stores an entry, replacing any previous one.
    async fn put(&self, cache: &str, key: &str, response: &Response) -> Result<()>;

    /// Removes an entry. Returns false if it was absent.
    async fn remove(&self, cache: &str, key: &str) -> Result<bool>;
}

/// A handle to one opened cache, borrowed from its storage.
pub struct CacheHandle<'a, S: CacheStorage + ?Sized> {
    storage: &'a S,
    name: &'a str,
}

impl<'a, S: CacheStorage + ?Sized> CacheHandle<'a, S> {
    /// Opens `name` on `storage` and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot create the cache.
    pub async fn open(storage: &'a S, name: &'a str) -> Result<Self> {
        storage.open(name).await?;
        Ok(Self { storage, name })
    }

    /// Returns the cache name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Lists stored request keys.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.storage.keys(self.name).await
    }

    /// Looks up an entry.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn get(&self, key: &str) -> Result<Option<Response>> {
        self.storage.get(self.name, key).await
    }

    /// Stores an entry.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn put(&self, key: &str, response: &Response) -> Result<()> {
        self.storage.put(self.name, key, response).await
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.storage.remove(self.name, key).await
    }

    /// Copies every entry of `self` into `target`, overwriting existing keys.
    /// Returns the number of entries copied.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn copy_into(&self, target: &CacheHandle<'_, S>) -> Result<usize> {
        let keys = self.keys().await?;
        let mut copied = 0;
        for key in keys {
            if let Some(response) = self.get(&key).await? {
                target.put(&key, &response).await?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

type Entries = BTreeMap<String, Response>;

/// In-process cache storage. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    caches: Mutex<HashMap<String, Entries>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entries>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, cache: &str) -> Result<()> {
        self.lock().entry(cache.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, cache: &str) -> Result<bool> {
        Ok(self.lock().contains_key(cache))
    }

    async fn delete(&self, cache: &str) -> Result<bool> {
        Ok(self.lock().remove(cache).is_some())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .get(cache)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, cache: &str, key: &str) -> Result<Option<Response>> {
        Ok(self.lock().get(cache).and_then(|e| e.get(key)).cloned())
    }

    async fn put(&self, cache: &str, key: &str, response: &Response) -> Result<()> {
        self.lock()
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn remove(&self, cache: &str, key: &str) -> Result<bool> {
        Ok(self
            .lock()
            .get_mut(cache)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }
}
