//! Key/value storage backends for the persisted session.
//!
//! Every backend applies a batch of operations atomically: readers observe
//! either none or all of a batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::{ClientError, ClientResult};

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Set `key` to `value`.
    Set(String, String),
    /// Remove `key`.
    Remove(String),
}

impl StorageOp {
    /// Convenience constructor for [`StorageOp::Set`].
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        Self::Set(key.to_string(), value.into())
    }

    /// Convenience constructor for [`StorageOp::Remove`].
    pub fn remove(key: &str) -> Self {
        Self::Remove(key.to_string())
    }
}

/// String key/value persistence.
#[async_trait]
pub trait KeyValueStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Reads one key.
    async fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Applies all operations as one atomic batch.
    async fn apply(&self, batch: Vec<StorageOp>) -> ClientResult<()>;
}

fn apply_ops(map: &mut HashMap<String, String>, batch: Vec<StorageOp>) {
    for op in batch {
        match op {
            StorageOp::Set(key, value) => {
                map.insert(key, value);
            }
            StorageOp::Remove(key) => {
                map.remove(&key);
            }
        }
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn apply(&self, batch: Vec<StorageOp>) -> ClientResult<()> {
        let mut entries = self.entries.write().await;
        apply_ops(&mut entries, batch);
        Ok(())
    }
}

/// JSON-file storage.
///
/// Each batch rewrites the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<Option<HashMap<String, String>>>,
}

impl FileStorage {
    /// Creates storage backed by `path`. The file is read lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ClientResult<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Session file is corrupt, starting empty"
                    );
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, map: &HashMap<String, String>) -> ClientResult<()> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| ClientError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ClientError::Storage(format!("Failed to replace {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn apply(&self, batch: Vec<StorageOp>) -> ClientResult<()> {
        let mut cache = self.cache.lock().await;
        let mut next = match cache.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        let previous = next.clone();
        apply_ops(&mut next, batch);

        match self.write(&next).await {
            Ok(()) => {
                *cache = Some(next);
                Ok(())
            }
            Err(e) => {
                *cache = Some(previous);
                Err(e)
            }
        }
    }
}
