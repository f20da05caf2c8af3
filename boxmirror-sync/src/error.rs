//! Error types for the sync layer.

use boxmirror_blobstore::BlobStoreError;
use boxmirror_storage::StorageError;
use boxmirror_types::{CollaborationId, ItemId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while applying or draining events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The referenced item is not in the mirror.
    #[error("item not in mirror: {0}")]
    NotFoundLocal(ItemId),

    /// The referenced collaboration is not in the mirror.
    #[error("collaboration not in mirror: {0}")]
    CollaborationNotFound(CollaborationId),

    /// The event contradicts the mirrored state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The notification could not be decoded.
    #[error("malformed event: {0}")]
    Malformed(#[from] boxmirror_types::Error),

    /// Mirror store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Object store error.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobStoreError),

    /// Network error talking to the source system.
    #[error("network error: {0}")]
    Network(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Whether retrying the same message may succeed.
    ///
    /// Network, storage and channel failures are transient and must be
    /// surfaced so the queue redelivers.
    pub fn is_redeliverable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Blob(_) | Self::Network(_) | Self::ChannelClosed
        )
    }

    /// Whether the error counts as success on best-effort paths: the
    /// message is logged and acknowledged.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::NotFoundLocal(_) | Self::CollaborationNotFound(_)
        )
    }
}
