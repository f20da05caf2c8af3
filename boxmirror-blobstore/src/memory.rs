//! In-memory blob store.

use crate::{BlobStore, BlobStoreError, BlobStoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Blob store backed by an ordered map. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobStoreResult<()> {
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobStoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BlobStoreResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> BlobStoreResult<()> {
        let mut blobs = self.blobs.write().await;
        let data = blobs
            .get(from)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(from.to_string()))?;
        blobs.insert(to.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> BlobStoreResult<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> BlobStoreResult<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }
}
