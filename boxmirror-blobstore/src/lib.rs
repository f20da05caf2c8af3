//! Object store backends for the Box mirror connector.
//!
//! Keys are `/`-separated strings such as `docs/0/1/10`. A store has no
//! notion of directories; listing is by key prefix.
//!
//! Backends:
//! - [`MemoryBlobStore`] keeps everything in a map (tests, dry runs)
//! - [`FsBlobStore`] maps keys onto files below a root directory
//! - `S3BlobStore` talks to an S3 bucket (feature `s3`)

mod error;
mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use error::{BlobStoreError, BlobStoreResult};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

use async_trait::async_trait;

/// A flat key/value object store.
///
/// `delete` is idempotent: removing an absent key succeeds. `copy` fails
/// with [`BlobStoreError::NotFound`] when the source key is absent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `data` under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobStoreResult<()>;

    /// Reads the value under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> BlobStoreResult<Option<Vec<u8>>>;

    /// Removes `key` if present.
    async fn delete(&self, key: &str) -> BlobStoreResult<()>;

    /// Copies the value under `from` to `to`.
    async fn copy(&self, from: &str, to: &str) -> BlobStoreResult<()>;

    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> BlobStoreResult<Vec<String>>;

    /// Whether `key` exists.
    async fn exists(&self, key: &str) -> BlobStoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Moves `from` to `to`. A missing source is not an error, so a
    /// retried move after a partial failure converges.
    async fn rename(&self, from: &str, to: &str) -> BlobStoreResult<()> {
        if from == to {
            return Ok(());
        }
        match self.copy(from, to).await {
            Ok(()) => self.delete(from).await,
            Err(BlobStoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for std::sync::Arc<T> {
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobStoreResult<()> {
        (**self).put(key, data).await
    }

    async fn get(&self, key: &str) -> BlobStoreResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> BlobStoreResult<()> {
        (**self).delete(key).await
    }

    async fn copy(&self, from: &str, to: &str) -> BlobStoreResult<()> {
        (**self).copy(from, to).await
    }

    async fn list(&self, prefix: &str) -> BlobStoreResult<Vec<String>> {
        (**self).list(prefix).await
    }

    async fn exists(&self, key: &str) -> BlobStoreResult<bool> {
        (**self).exists(key).await
    }
}
