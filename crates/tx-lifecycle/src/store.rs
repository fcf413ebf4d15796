//! [`KeyValueStore`] implementations.

use crate::ports::KeyValueStore;
use anyhow::{
    Context,
    anyhow,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
};

/// Store keeping every document in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(key: impl Into<String>, value: Value) -> Self {
        let store = Self::new();
        store.documents.lock().insert(key.into(), value);
        store
    }

    /// Synchronous read of a document.
    pub fn document(&self, key: &str) -> Option<Value> {
        self.documents.lock().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.document(key))
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.documents.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Store keeping one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create store at {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_of(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(anyhow!("invalid store key `{key}`"))
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let path = self.path_of(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let path = self.path_of(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&value)?;
        tokio::fs::write(&tmp_path, bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_store_persists_documents_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let document = json!({"0x1": {"id1": {"id": "id1"}}});

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("transactions.ethereum").await.unwrap(), None);
        store
            .set("transactions.ethereum", document.clone())
            .await
            .unwrap();

        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("transactions.ethereum").await.unwrap(),
            Some(document)
        );
    }

    #[tokio::test]
    async fn file_store_rejects_keys_escaping_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let result = store.set("../outside", json!({})).await;

        assert!(result.is_err());
    }
}
