//! Applies a transform to every descendant of a folder.

use crate::config::Traversal;
use crate::error::SyncResult;
use boxmirror_storage::MirrorStore;
use boxmirror_types::{Item, ItemId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Walks a folder's subtree in the mirror.
///
/// Each descendant is visited exactly once. The transform sees one item at
/// a time and may only depend on that item's own fields, so the result does
/// not depend on traversal order.
pub struct Propagator {
    store: Arc<dyn MirrorStore>,
    traversal: Traversal,
}

impl Propagator {
    pub fn new(store: Arc<dyn MirrorStore>, traversal: Traversal) -> Self {
        Self { store, traversal }
    }

    /// Every descendant of `root`, excluding `root` itself.
    pub fn descendants(&self, root: &Item) -> SyncResult<Vec<Item>> {
        if !root.is_folder() {
            return Ok(Vec::new());
        }
        match self.traversal {
            Traversal::ParentLinks => self.walk_parent_links(root),
            Traversal::LocationPrefix => self.query_location_prefix(root),
        }
    }

    /// Applies `transform` to every descendant of `root` and then, if
    /// `include_root`, to `root`. All changed rows are written in one
    /// transaction. Returns the transformed items, root last.
    pub fn propagate(
        &self,
        root: &Item,
        include_root: bool,
        mut transform: impl FnMut(&mut Item),
    ) -> SyncResult<Vec<Item>> {
        let mut items = self.descendants(root)?;
        if include_root {
            items.push(root.clone());
        }
        for item in &mut items {
            transform(item);
        }
        self.store.upsert_items(&items)?;
        debug!(root = %root.id, count = items.len(), "Propagated update");
        Ok(items)
    }

    fn walk_parent_links(&self, root: &Item) -> SyncResult<Vec<Item>> {
        let mut out = Vec::new();
        let mut visited: HashSet<ItemId> = HashSet::from([root.id.clone()]);
        let mut stack = vec![root.id.clone()];

        while let Some(folder_id) = stack.pop() {
            for child in self.store.children(&folder_id)? {
                if !visited.insert(child.id.clone()) {
                    warn!(root = %root.id, item_id = %child.id, "Item reached twice, skipping");
                    continue;
                }
                if child.is_folder() {
                    stack.push(child.id.clone());
                }
                out.push(child);
            }
        }
        Ok(out)
    }

    fn query_location_prefix(&self, root: &Item) -> SyncResult<Vec<Item>> {
        let mut seen: HashSet<ItemId> = HashSet::from([root.id.clone()]);
        Ok(self
            .store
            .items_with_location_prefix(&root.location)?
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect())
    }
}
