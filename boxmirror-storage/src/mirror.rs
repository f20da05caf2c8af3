//! The mirror store contract.

use crate::StorageResult;
use boxmirror_types::{Collaboration, CollaborationId, Item, ItemId};

/// Persisted items and collaborations.
///
/// Upserts are idempotent: writing the same row twice leaves the store as
/// if it had been written once.
pub trait MirrorStore: Send + Sync {
    /// Loads an item by id.
    fn get_item(&self, id: &ItemId) -> StorageResult<Option<Item>>;

    /// Inserts or replaces an item.
    fn upsert_item(&self, item: &Item) -> StorageResult<()>;

    /// Inserts or replaces several items atomically.
    fn upsert_items(&self, items: &[Item]) -> StorageResult<()>;

    /// Removes an item row. Returns whether a row existed.
    fn delete_item(&self, id: &ItemId) -> StorageResult<bool>;

    /// Direct children of a folder.
    fn children(&self, parent_id: &ItemId) -> StorageResult<Vec<Item>>;

    /// Items whose location starts with `prefix`.
    fn items_with_location_prefix(&self, prefix: &str) -> StorageResult<Vec<Item>>;

    /// Items the writer still has work for, deepest locations first.
    fn dirty_items(&self) -> StorageResult<Vec<Item>>;

    /// Inserts or replaces a collaboration.
    fn upsert_collaboration(&self, collaboration: &Collaboration) -> StorageResult<()>;

    /// Loads a collaboration by id.
    fn get_collaboration(&self, id: &CollaborationId) -> StorageResult<Option<Collaboration>>;

    /// Removes a collaboration. Returns whether a row existed.
    fn delete_collaboration(&self, id: &CollaborationId) -> StorageResult<bool>;

    /// All collaborations recorded on an item, in id order.
    fn collaborations_for_item(&self, item_id: &ItemId) -> StorageResult<Vec<Collaboration>>;
}
