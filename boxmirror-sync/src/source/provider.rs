//! Hierarchy provider contract and an in-memory implementation.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use boxmirror_types::{Collaboration, ItemId, ItemKind, ItemSnapshot};
use std::collections::HashMap;
use std::sync::RwLock;

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    /// Files and folders on the page.
    pub items: Vec<ItemSnapshot>,
    /// Number of entries the source returned, including kinds that are
    /// not mirrored (web links). Drives pagination.
    pub received: usize,
}

/// Read access to the source system.
#[async_trait]
pub trait HierarchyProvider: Send + Sync {
    /// Fetches a single folder.
    async fn folder(&self, id: &ItemId) -> SyncResult<ItemSnapshot>;

    /// Lists one page of a folder's children.
    async fn list_children(
        &self,
        folder: &ItemId,
        limit: usize,
        offset: usize,
    ) -> SyncResult<ChildPage>;

    /// Collaborations recorded directly on an item.
    async fn list_collaborations(
        &self,
        id: &ItemId,
        kind: ItemKind,
    ) -> SyncResult<Vec<Collaboration>>;

    /// Downloads a file's content, or `None` if the source no longer has it.
    async fn download(&self, file: &ItemId) -> SyncResult<Option<Vec<u8>>>;

    /// Lists every child of a folder, paging until a page comes back short.
    async fn list_all_children(
        &self,
        folder: &ItemId,
        limit: usize,
    ) -> SyncResult<Vec<ItemSnapshot>> {
        if limit == 0 {
            return Err(SyncError::Config("page limit must be positive".into()));
        }
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.list_children(folder, limit, offset).await?;
            all.extend(page.items);
            if page.received < limit {
                break;
            }
            offset += limit;
        }
        Ok(all)
    }
}

#[derive(Default)]
struct StaticState {
    folders: HashMap<ItemId, ItemSnapshot>,
    children: HashMap<ItemId, Vec<ItemSnapshot>>,
    collaborations: HashMap<ItemId, Vec<Collaboration>>,
    content: HashMap<ItemId, Vec<u8>>,
}

/// In-memory hierarchy, for tests and dry runs.
#[derive(Default)]
pub struct StaticHierarchy {
    state: RwLock<StaticState>,
}

impl StaticHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an item under its parent. Folders become fetchable.
    pub fn add_item(&self, snapshot: ItemSnapshot) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if snapshot.kind == ItemKind::Folder {
            state.folders.insert(snapshot.id.clone(), snapshot.clone());
        }
        if let Some(parent) = snapshot.parent_id.clone() {
            let siblings = state.children.entry(parent).or_default();
            siblings.retain(|s| s.id != snapshot.id);
            siblings.push(snapshot);
        }
    }

    pub fn add_collaboration(&self, collaboration: Collaboration) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .collaborations
            .entry(collaboration.item_id.clone())
            .or_default()
            .push(collaboration);
    }

    pub fn set_content(&self, file: impl Into<ItemId>, data: impl Into<Vec<u8>>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.content.insert(file.into(), data.into());
    }

    pub fn remove_content(&self, file: &ItemId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.content.remove(file);
    }
}

#[async_trait]
impl HierarchyProvider for StaticHierarchy {
    async fn folder(&self, id: &ItemId) -> SyncResult<ItemSnapshot> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .folders
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("folder {id} not found")))
    }

    async fn list_children(
        &self,
        folder: &ItemId,
        limit: usize,
        offset: usize,
    ) -> SyncResult<ChildPage> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let items: Vec<_> = state
            .children
            .get(folder)
            .map(|c| c.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(ChildPage {
            received: items.len(),
            items,
        })
    }

    async fn list_collaborations(
        &self,
        id: &ItemId,
        _kind: ItemKind,
    ) -> SyncResult<Vec<Collaboration>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.collaborations.get(id).cloned().unwrap_or_default())
    }

    async fn download(&self, file: &ItemId) -> SyncResult<Option<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.content.get(file).cloned())
    }
}
