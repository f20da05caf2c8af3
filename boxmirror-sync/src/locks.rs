//! Per-item serialization.
//!
//! Work on a single item holds that item's lock plus a shared hold on the
//! tree lock. Operations that rewrite a whole subtree take the tree lock
//! exclusively instead, which keeps them from interleaving with per-item
//! work on any descendant.

use boxmirror_types::ItemId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

/// Entries beyond this count are pruned of unused locks on acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// Lock table shared by the synchronizer and the writer.
#[derive(Default)]
pub struct ItemLocks {
    tree: Arc<RwLock<()>>,
    items: Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>,
}

/// Held while working on a single item.
pub struct ItemGuard {
    _item: OwnedMutexGuard<()>,
    _tree: OwnedRwLockReadGuard<()>,
}

/// Held while rewriting a subtree.
pub struct TreeGuard {
    _tree: OwnedRwLockWriteGuard<()>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn item(&self, id: &ItemId) -> ItemGuard {
        let tree = self.tree.clone().read_owned().await;
        let lock = self.item_lock(id);
        ItemGuard {
            _item: lock.lock_owned().await,
            _tree: tree,
        }
    }

    pub async fn tree(&self) -> TreeGuard {
        TreeGuard {
            _tree: self.tree.clone().write_owned().await,
        }
    }

    fn item_lock(&self, id: &ItemId) -> Arc<AsyncMutex<()>> {
        // The map holds no invariant a panic could break.
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() > PRUNE_THRESHOLD {
            items.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        items.entry(id.clone()).or_default().clone()
    }
}
