//! Applies canonical operations to the mirror.
//!
//! The synchronizer only touches the mirror store and the ACL feed's keys.
//! Content and metadata are materialized later by the writer, driven by
//! the dirty flags and pending relocations set here.

use crate::acl::FeedHandle;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::layout::rebase;
use crate::locks::{ItemGuard, ItemLocks, TreeGuard};
use crate::propagator::Propagator;
use boxmirror_storage::MirrorStore;
use boxmirror_types::{
    Collaboration, CollaborationId, IgnoreReason, Item, ItemId, ItemKind, ItemSnapshot, Operation,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of applying one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The mirror changed.
    Applied,
    /// Nothing to do: a redelivery, a no-op trigger or the skip-existing
    /// policy.
    Unchanged,
    /// Deliberately not mirrored.
    Ignored(IgnoreReason),
    /// The collaboration was recorded before its item exists. The item's
    /// create notification picks it up.
    Deferred,
}

/// Locks held for the duration of one operation.
#[derive(Default)]
struct Held {
    _item: Option<ItemGuard>,
    _tree: Option<TreeGuard>,
}

pub struct Synchronizer {
    store: Arc<dyn MirrorStore>,
    propagator: Propagator,
    feed: FeedHandle,
    locks: Arc<ItemLocks>,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        feed: FeedHandle,
        locks: Arc<ItemLocks>,
        config: SyncConfig,
    ) -> Self {
        let propagator = Propagator::new(store.clone(), config.traversal);
        Self {
            store,
            propagator,
            feed,
            locks,
            config,
        }
    }

    /// Applies one operation.
    ///
    /// Safe to repeat: applying an operation twice leaves the mirror as
    /// applying it once. Fails with [`SyncError::NotFoundLocal`] when the
    /// item is not mirrored and with [`SyncError::Conflict`] when the
    /// operation contradicts the mirror.
    pub async fn apply(&self, op: &Operation) -> SyncResult<Outcome> {
        let _held = self.lock_for(op).await;
        debug!(op = op.name(), subject = ?op.subject(), "Applying operation");

        let outcome = match op {
            Operation::ItemCreated(snapshot) => self.create(snapshot)?,
            Operation::ItemTrashed { id, kind } => self.set_trashed(id, *kind, true)?,
            Operation::ItemRestored { id, kind } => self.set_trashed(id, *kind, false)?,
            Operation::ItemDeleted { id, kind } => self.delete(id, *kind)?,
            Operation::ItemMoved {
                id,
                kind,
                parent_id,
                path,
            } => {
                self.relocate(id, *kind, parent_id.as_ref(), path.as_deref())
                    .await?
            }
            Operation::ItemRenamed { id, kind, name } => self.rename(id, *kind, name)?,
            Operation::CollaborationAccepted(grant) => self.accept_collaboration(grant)?,
            Operation::CollaborationRemoved { id, item_id } => {
                self.remove_collaboration(id, item_id.as_ref())?
            }
            Operation::ItemCopied { .. }
            | Operation::CollaborationCreated { .. }
            | Operation::CollaborationUpdated { .. } => Outcome::Unchanged,
            Operation::Ignored { trigger, reason } => {
                debug!(trigger = %trigger, ?reason, "Ignoring notification");
                Outcome::Ignored(reason.clone())
            }
        };

        info!(op = op.name(), subject = ?op.subject(), ?outcome, "Applied operation");
        Ok(outcome)
    }

    async fn lock_for(&self, op: &Operation) -> Held {
        let subtree = match op {
            Operation::ItemTrashed { kind, .. }
            | Operation::ItemRestored { kind, .. }
            | Operation::ItemDeleted { kind, .. }
            | Operation::ItemMoved { kind, .. } => *kind == ItemKind::Folder,
            Operation::CollaborationAccepted(grant) => grant.item_kind == ItemKind::Folder,
            // The item's kind is only known after a lookup.
            Operation::CollaborationRemoved { .. } => true,
            _ => false,
        };
        if subtree {
            return Held {
                _tree: Some(self.locks.tree().await),
                ..Held::default()
            };
        }
        match op.subject() {
            Some(id) => Held {
                _item: Some(self.locks.item(id).await),
                ..Held::default()
            },
            None => Held::default(),
        }
    }

    // ── Items ───────────────────────────────────────────────────────

    fn create(&self, snapshot: &ItemSnapshot) -> SyncResult<Outcome> {
        let existing = self.store.get_item(&snapshot.id)?;
        if let Some(existing) = &existing {
            if self.config.skip_existing_items {
                debug!(item_id = %snapshot.id, "Item already mirrored, skipping");
                return Ok(Outcome::Unchanged);
            }
            check_kind(existing, snapshot.kind)?;
        }

        let location = self.locate(
            &snapshot.id,
            snapshot.kind,
            snapshot.parent_id.as_ref(),
            snapshot.path.as_deref(),
        )?;
        let mut item = Item::from_snapshot(snapshot.clone(), location);

        // Placement changes arrive as moves; a repeated create only
        // refreshes the item's own fields.
        if let Some(existing) = existing {
            item.parent_id = existing.parent_id;
            item.location = existing.location;
            item.stored_location = existing.stored_location;
            item.trashed = existing.trashed;
            item.deleted = existing.deleted;
            item.published_acl = existing.published_acl;
        }

        self.store.upsert_item(&item)?;
        Ok(Outcome::Applied)
    }

    fn set_trashed(&self, id: &ItemId, kind: ItemKind, trashed: bool) -> SyncResult<Outcome> {
        let item = self.require_live(id, kind)?;
        if item.trashed == trashed {
            return Ok(Outcome::Unchanged);
        }

        let layout = &self.config.layout;
        self.propagator.propagate(&item, true, |i| {
            i.location = if trashed {
                layout.to_trashed(&i.location)
            } else {
                layout.to_document(&i.location)
            };
            i.trashed = trashed;
            i.metadata_dirty = true;
        })?;
        Ok(Outcome::Applied)
    }

    fn delete(&self, id: &ItemId, kind: ItemKind) -> SyncResult<Outcome> {
        let item = self.require(id, kind)?;
        if item.deleted {
            return Ok(Outcome::Unchanged);
        }
        // Rows go away when the writer has removed their artifacts.
        self.propagator.propagate(&item, true, |i| i.deleted = true)?;
        Ok(Outcome::Applied)
    }

    async fn relocate(
        &self,
        id: &ItemId,
        kind: ItemKind,
        parent_id: Option<&ItemId>,
        path: Option<&[ItemId]>,
    ) -> SyncResult<Outcome> {
        let item = self.require_live(id, kind)?;
        let new_parent = parent_id.or_else(|| path.and_then(|p| p.last())).cloned();

        if let Some(parent) = &new_parent {
            if parent == id || path.is_some_and(|p| p.contains(id)) {
                return Err(SyncError::Conflict(format!("{id} cannot be moved into itself")));
            }
            if item.is_folder() && self.is_descendant(parent, id)? {
                return Err(SyncError::Conflict(format!(
                    "{id} cannot be moved into its own subtree ({parent})"
                )));
            }
        }

        let layout = &self.config.layout;
        let mut location = self.locate(id, kind, parent_id, path)?;
        if item.trashed {
            location = layout.to_trashed(&location);
        }
        if location == item.location && new_parent == item.parent_id {
            return Ok(Outcome::Unchanged);
        }

        let from = layout.feed_key(&item.location);
        let to = layout.feed_key(&location);
        if from != to {
            if item.is_folder() {
                self.feed.rename_prefix(&from, &to).await?;
            } else {
                self.feed.rename_record(&from, &to).await?;
            }
        }

        let old = item.location.clone();
        let old_trashed = layout.to_trashed(&old);
        let new_trashed = layout.to_trashed(&location);
        self.propagator.propagate(&item, true, |i| {
            if i.id == *id {
                i.parent_id = new_parent.clone();
                i.location = location.clone();
            } else if let Some(moved) = rebase(&i.location, &old, &location)
                .or_else(|| rebase(&i.location, &old_trashed, &new_trashed))
            {
                i.location = moved;
            }
            // Inherited grants depend on the new ancestors.
            i.metadata_dirty = true;
        })?;
        debug!(item_id = %id, from = %old, to = %location, "Relocated item");
        Ok(Outcome::Applied)
    }

    fn rename(&self, id: &ItemId, kind: ItemKind, name: &str) -> SyncResult<Outcome> {
        let mut item = self.require_live(id, kind)?;
        if item.name == name {
            return Ok(Outcome::Unchanged);
        }
        item.name = name.to_string();
        item.metadata_dirty = true;
        self.store.upsert_item(&item)?;
        Ok(Outcome::Applied)
    }

    // ── Collaborations ──────────────────────────────────────────────

    fn accept_collaboration(&self, grant: &Collaboration) -> SyncResult<Outcome> {
        let item = self.store.get_item(&grant.item_id)?;
        if let Some(item) = &item {
            check_kind(item, grant.item_kind)?;
        }
        self.store.upsert_collaboration(grant)?;

        let Some(item) = item else {
            info!(
                collaboration_id = %grant.id,
                item_id = %grant.item_id,
                "Collaboration precedes its item, deferring"
            );
            return Ok(Outcome::Deferred);
        };
        self.mark_subtree_metadata_dirty(&item)?;
        Ok(Outcome::Applied)
    }

    fn remove_collaboration(
        &self,
        id: &CollaborationId,
        reported_item: Option<&ItemId>,
    ) -> SyncResult<Outcome> {
        let Some(existing) = self.store.get_collaboration(id)? else {
            return Err(SyncError::CollaborationNotFound(id.clone()));
        };
        let item_id = existing.item_id;
        if let Some(reported) = reported_item.filter(|r| **r != item_id) {
            debug!(
                collaboration_id = %id,
                mirrored = %item_id,
                reported = %reported,
                "Collaboration item differs from notification"
            );
        }
        self.store.delete_collaboration(id)?;

        match self.store.get_item(&item_id)? {
            Some(item) if !item.deleted => self.mark_subtree_metadata_dirty(&item)?,
            _ => debug!(collaboration_id = %id, item_id = %item_id, "Collaboration item gone"),
        }
        Ok(Outcome::Applied)
    }

    fn mark_subtree_metadata_dirty(&self, item: &Item) -> SyncResult<()> {
        self.propagator
            .propagate(item, true, |i| i.metadata_dirty = true)?;
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn require(&self, id: &ItemId, kind: ItemKind) -> SyncResult<Item> {
        let item = self
            .store
            .get_item(id)?
            .ok_or_else(|| SyncError::NotFoundLocal(id.clone()))?;
        check_kind(&item, kind)?;
        Ok(item)
    }

    /// Like [`Self::require`], but an item awaiting deletion counts as gone.
    fn require_live(&self, id: &ItemId, kind: ItemKind) -> SyncResult<Item> {
        let item = self.require(id, kind)?;
        if item.deleted {
            return Err(SyncError::NotFoundLocal(id.clone()));
        }
        Ok(item)
    }

    /// Document-namespace location from the notification's hierarchy:
    /// the path if present, else the mirrored parent, else the bare parent
    /// id.
    fn locate(
        &self,
        id: &ItemId,
        kind: ItemKind,
        parent_id: Option<&ItemId>,
        path: Option<&[ItemId]>,
    ) -> SyncResult<String> {
        let layout = &self.config.layout;
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            return Ok(layout.location_for(id, kind, path));
        }
        let location = match parent_id {
            Some(parent_id) => match self.store.get_item(parent_id)? {
                Some(parent) => layout.location_under(&parent.location, id, kind),
                None => layout.location_for(id, kind, std::slice::from_ref(parent_id)),
            },
            None => layout.location_for(id, kind, &[]),
        };
        Ok(location)
    }

    /// Whether `candidate` sits at or below `ancestor` in the mirror.
    fn is_descendant(&self, candidate: &ItemId, ancestor: &ItemId) -> SyncResult<bool> {
        let mut visited = HashSet::new();
        let mut current = Some(candidate.clone());
        while let Some(id) = current {
            if id == *ancestor {
                return Ok(true);
            }
            if !visited.insert(id.clone()) {
                break;
            }
            current = self.store.get_item(&id)?.and_then(|i| i.parent_id);
        }
        Ok(false)
    }
}

fn check_kind(item: &Item, kind: ItemKind) -> SyncResult<()> {
    if item.kind != kind {
        return Err(SyncError::Conflict(format!(
            "{kind} event for mirrored {} {}",
            item.kind, item.id
        )));
    }
    Ok(())
}
