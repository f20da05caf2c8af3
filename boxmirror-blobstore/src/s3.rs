//! S3 blob store.

use crate::{BlobStore, BlobStoreError, BlobStoreResult};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::debug;

/// Blob store backed by a single S3 bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn s3_err(op: &str, key: &str, e: impl std::fmt::Display) -> BlobStoreError {
    BlobStoreError::Storage(format!("S3 {op} {key}: {e}"))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> BlobStoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.into())
            .send()
            .await
            .map_err(|e| s3_err("put", key, e))?;
        debug!(key, "S3 put");
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobStoreResult<Option<Vec<u8>>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(s3_err("get", key, e));
            }
        };
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| s3_err("get", key, e))?;
        Ok(Some(data.into_bytes().to_vec()))
    }

    async fn delete(&self, key: &str) -> BlobStoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_err("delete", key, e))?;
        debug!(key, "S3 delete");
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> BlobStoreResult<()> {
        if !self.exists(from).await? {
            return Err(BlobStoreError::NotFound(from.to_string()));
        }
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, from))
            .key(to)
            .send()
            .await
            .map_err(|e| s3_err("copy", from, e))?;
        debug!(from, to, "S3 copy");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> BlobStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| s3_err("list", prefix, e))?;
            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> BlobStoreResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(s3_err("head", key, e)),
        }
    }
}
