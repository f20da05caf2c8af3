//! Connector configuration.

use crate::error::{SyncError, SyncResult};
use boxmirror_types::ItemId;
use serde::{Deserialize, Serialize};

/// How object keys encode an item's place in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    /// `docs/<ancestor ids>/<id>`, folders with a trailing `/`.
    #[default]
    Hierarchical,
    /// `docs/<id>`; moves never change the key.
    Flat,
}

/// How the propagator finds a folder's descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Depth-first walk over parent links.
    #[default]
    ParentLinks,
    /// Prefix query over materialized locations. Needs hierarchical keys.
    LocationPrefix,
}

/// Object store key layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    /// Namespace for live documents.
    pub document_prefix: String,
    /// Namespace for trashed documents.
    pub trashed_prefix: String,
    /// Appended to a content key to form its metadata key.
    pub metadata_suffix: String,
    /// Key of the shared ACL feed document.
    pub acl_feed_key: String,
    /// Bucket name, used in the feed's `s3://<bucket>/` key prefixes.
    pub bucket: String,
    pub key_style: KeyStyle,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            document_prefix: "docs/".to_string(),
            trashed_prefix: "trashed/".to_string(),
            metadata_suffix: ".metadata.json".to_string(),
            acl_feed_key: "acl.json".to_string(),
            bucket: String::new(),
            key_style: KeyStyle::Hierarchical,
        }
    }
}

/// Configuration for the synchronizer, writer and connector loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Folders at which ACL inheritance stops (inclusive).
    pub root_folder_ids: Vec<ItemId>,
    /// Leave already-mirrored items alone on create notifications.
    pub skip_existing_items: bool,
    pub layout: StorageLayout,
    /// Base of the `_source_uri` attribute, e.g. `https://app.box.com/`.
    pub source_uri_prefix: String,
    pub traversal: Traversal,
    /// Maximum number of messages or items processed concurrently.
    pub worker_count: usize,
    /// Maximum number of messages received per batch.
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_folder_ids: Vec::new(),
            skip_existing_items: false,
            layout: StorageLayout::default(),
            source_uri_prefix: "https://app.box.com/".to_string(),
            traversal: Traversal::ParentLinks,
            worker_count: 4,
            batch_size: 10,
        }
    }
}

impl SyncConfig {
    /// Checks settings that would otherwise fail deep inside a drain.
    pub fn validate(&self) -> SyncResult<()> {
        let invalid =
            |reason: &str| -> SyncResult<()> { Err(SyncError::Config(reason.to_string())) };
        let layout = &self.layout;
        if layout.document_prefix.is_empty() || layout.trashed_prefix.is_empty() {
            return invalid("document and trashed prefixes must be set");
        }
        if layout.document_prefix == layout.trashed_prefix {
            return invalid("document and trashed prefixes must differ");
        }
        if !layout.document_prefix.ends_with('/') || !layout.trashed_prefix.ends_with('/') {
            return invalid("prefixes must end with '/'");
        }
        if layout.metadata_suffix.is_empty() {
            return invalid("metadata suffix must be set");
        }
        if layout.bucket.is_empty() {
            return invalid("bucket must be set");
        }
        if self.traversal == Traversal::LocationPrefix && layout.key_style == KeyStyle::Flat {
            return invalid("location-prefix traversal needs hierarchical keys");
        }
        if self.worker_count == 0 || self.batch_size == 0 {
            return invalid("worker_count and batch_size must be positive");
        }
        Ok(())
    }

    pub fn is_root_folder(&self, id: &ItemId) -> bool {
        self.root_folder_ids.contains(id)
    }
}
