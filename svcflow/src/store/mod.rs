//! Persistence side channel for produced ids.
//!
//! The pipeline writes each key a stage adds to the context into a
//! [`Store`], so that a later process can pick up where a run left off
//! (for example, polling a deployment created by an earlier invocation).
//! The store is never read during a run; [`seed_context_from_store`]
//! reads it once to build an initial context.

use crate::context::PipelineContext;
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key/value persistence for produced ids.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the value cannot be written.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no value exists.
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Deletes a value. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if an existing value cannot be deleted.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, String>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a snapshot of a value, without the async interface.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.peek(key).ok_or_else(|| StoreError::not_found(key))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.txt` file per key under a directory.
///
/// Values are trimmed on read; an empty file reads as not found.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.txt")))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key is empty".to_string(),
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "only ASCII letters, digits, '_' and '-' are allowed".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, value).await?;
        debug!(key, path = %path.display(), "Stored value");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let value = text.trim();
                if value.is_empty() {
                    Err(StoreError::not_found(key))
                } else {
                    Ok(value.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::not_found(key)),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, path = %path.display(), "Removed value");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Builds an initial context from stored values.
///
/// Keys with no stored value are skipped (and logged), which leaves the
/// stage that needs them to fail with a missing input.
///
/// # Errors
///
/// Returns any store error other than not-found.
pub async fn seed_context_from_store<'a>(
    store: &dyn Store,
    keys: impl IntoIterator<Item = &'a str>,
) -> Result<PipelineContext, StoreError> {
    let mut context = PipelineContext::new();
    for key in keys {
        match store.get(key).await {
            Ok(value) => {
                if context.insert(key, serde_json::Value::String(value)).is_err() {
                    debug!(key, "Key listed twice; keeping the first value");
                }
            }
            Err(e) if e.is_not_found() => warn!(key, "No stored value to seed"),
            Err(e) => return Err(e),
        }
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_put_get() {
        let store = InMemoryStore::new();
        store.put("serviceId", "S1").await.unwrap();
        store.put("serviceId", "S2").await.unwrap();

        assert_eq!(store.get("serviceId").await.unwrap(), "S2");
        assert!(store.get("dataId").await.unwrap_err().is_not_found());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("ids"));

        store.put("deploymentId", "DEP1").await.unwrap();

        assert!(dir.path().join("ids").join("deploymentId.txt").exists());
        assert_eq!(store.get("deploymentId").await.unwrap(), "DEP1");
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileStore::new(dir.path());
        let memory = InMemoryStore::new();

        for store in [&file as &dyn Store, &memory] {
            store.put("experimentId", "E1").await.unwrap();
            store.remove("experimentId").await.unwrap();
            assert!(store.get("experimentId").await.unwrap_err().is_not_found());
            store.remove("experimentId").await.unwrap();
        }
        assert!(!dir.path().join("experimentId.txt").exists());
        assert!(matches!(
            file.remove("a/b").await.unwrap_err(),
            StoreError::InvalidKey { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_store_trims_and_treats_empty_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("serviceId.txt"), "  S1\n").unwrap();
        std::fs::write(dir.path().join("dataId.txt"), "\n").unwrap();
        let store = FileStore::new(dir.path());

        assert_eq!(store.get("serviceId").await.unwrap(), "S1");
        assert!(store.get("dataId").await.unwrap_err().is_not_found());
        assert!(store.get("reportId").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let err = store.put("../escape", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
        assert!(matches!(
            store.get("").await.unwrap_err(),
            StoreError::InvalidKey { .. }
        ));
    }

    #[tokio::test]
    async fn test_seed_skips_missing_keys() {
        let store = InMemoryStore::new();
        store.put("serviceId", "S1").await.unwrap();

        let context = seed_context_from_store(&store, ["serviceId", "deploymentId"])
            .await
            .unwrap();

        assert_eq!(context.get_str("serviceId"), Some("S1"));
        assert!(!context.contains_key("deploymentId"));
    }
}
