//! Disk-backed cache storage.
//!
//! Layout: one directory per cache under the storage root, one JSON file per
//! entry named by the SHA-256 of its request key. Every write goes to its own
//! uniquely named `.tmp` sibling and is renamed into place, so readers never
//! see a torn entry and concurrent writers to one key resolve to the last
//! rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::network::Response;
use crate::store::CacheStorage;

const ENTRY_EXT: &str = "json";

/// On-disk form of one cached response.
#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl EntryRecord {
    fn new(key: &str, response: &Response) -> Self {
        Self {
            key: key.to_string(),
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
        }
    }

    fn into_response(self) -> Result<Response> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| Error::Store(format!("corrupt body for {}: {e}", self.key)))?;
        Ok(Response {
            url: self.url,
            status: self.status,
            headers: self.headers,
            body: body.into(),
        })
    }
}

/// Cache storage persisted under a root directory.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, cache: &str) -> Result<PathBuf> {
        let valid = !cache.is_empty()
            && !cache.starts_with('.')
            && cache
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::Store(format!("invalid cache name {cache:?}")));
        }
        Ok(self.root.join(cache))
    }

    fn entry_path(&self, cache: &str, key: &str) -> Result<PathBuf> {
        let digest = Sha256::digest(key.as_bytes());
        Ok(self.cache_dir(cache)?.join(format!("{digest:x}.{ENTRY_EXT}")))
    }

    async fn read_record(path: &Path) -> Result<Option<EntryRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, cache: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.cache_dir(cache)?).await?;
        Ok(())
    }

    async fn has(&self, cache: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.cache_dir(cache)?)
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    async fn delete(&self, cache: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.cache_dir(cache)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let dir = self.cache_dir(cache)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && let Some(record) = Self::read_record(&path).await?
            {
                keys.push(record.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, cache: &str, key: &str) -> Result<Option<Response>> {
        let path = self.entry_path(cache, key)?;
        match Self::read_record(&path).await? {
            Some(record) if record.key == key => record.into_response().map(Some),
            Some(record) => Err(Error::Store(format!(
                "hash collision between {key:?} and {:?}",
                record.key
            ))),
            None => Ok(None),
        }
    }

    async fn put(&self, cache: &str, key: &str, response: &Response) -> Result<()> {
        let path = self.entry_path(cache, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(&EntryRecord::new(key, response))?;

        let written = match tokio::fs::write(&tmp_path, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, cache: &str, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(cache, key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
