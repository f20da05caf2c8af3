//! ACL composition over the mirrored hierarchy.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use boxmirror_storage::MirrorStore;
use boxmirror_types::{Access, AclEntry, Grantee, Item, ItemId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes the de-duplicated, inherited ACL of an item.
///
/// The walk starts at the item and climbs parent links until it has
/// included a configured root folder or runs out of mirrored parents.
/// Each level contributes its owner and accepted collaborators. A grantee
/// seen at several levels keeps the access of the level closest to the
/// item.
pub struct AclComposer {
    store: Arc<dyn MirrorStore>,
    root_folder_ids: Vec<ItemId>,
}

impl AclComposer {
    pub fn new(store: Arc<dyn MirrorStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            root_folder_ids: config.root_folder_ids.clone(),
        }
    }

    /// The composed ACL, sorted by (name, type).
    pub fn compose(&self, item: &Item) -> SyncResult<Vec<AclEntry>> {
        let mut acl: BTreeMap<Grantee, Access> = BTreeMap::new();
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut current = Some(item.clone());

        while let Some(level) = current.take() {
            if !visited.insert(level.id.clone()) {
                warn!(item_id = %item.id, at = %level.id, "Cycle in parent links, stopping ACL walk");
                break;
            }

            for (grantee, access) in self.level_grants(&level)? {
                // Closer levels were visited first and keep their value.
                acl.entry(grantee).or_insert(access);
            }

            if self.root_folder_ids.contains(&level.id) {
                break;
            }
            current = match &level.parent_id {
                Some(parent_id) => {
                    let parent = self.store.get_item(parent_id)?;
                    if parent.is_none() {
                        debug!(item_id = %item.id, parent_id = %parent_id, "ACL walk reached unmirrored parent");
                    }
                    parent
                }
                None => None,
            };
        }

        Ok(acl
            .into_iter()
            .map(|(grantee, access)| AclEntry::new(grantee, access))
            .collect())
    }

    /// Grants contributed by a single level, owner first.
    fn level_grants(&self, level: &Item) -> SyncResult<Vec<(Grantee, Access)>> {
        let mut grants = vec![(level.owner.clone(), Access::Allow)];
        grants.extend(
            self.store
                .collaborations_for_item(&level.id)?
                .into_iter()
                .filter(|c| c.is_accepted())
                .map(|c| (c.grantee, c.access)),
        );
        Ok(grants)
    }
}
