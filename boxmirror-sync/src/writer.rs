//! Materializes dirty mirror items into the object store.
//!
//! Per item, in order: finalize a delete, or else move artifacts left at
//! a stale location, write content, write metadata and the item's feed
//! record. Each flag is cleared only after its write succeeded, so a
//! failed drain leaves the flag set and a retry redoes the step.

use crate::acl::{AclComposer, FeedHandle};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::locks::ItemLocks;
use crate::metadata::MetadataDocument;
use crate::source::HierarchyProvider;
use boxmirror_blobstore::BlobStore;
use boxmirror_storage::MirrorStore;
use boxmirror_types::{AclEntry, Item, ItemId};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counts from a drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub relocated: usize,
    pub content_written: usize,
    pub metadata_written: usize,
    pub deleted: usize,
    /// Deleted folders still waiting for their children.
    pub waiting: usize,
}

impl DrainReport {
    fn record(&mut self, step: &Step) {
        match step {
            Step::Deleted => self.deleted += 1,
            Step::Waiting => self.waiting += 1,
            Step::Gone => {}
            Step::Written {
                relocated,
                content,
                metadata,
            } => {
                self.relocated += usize::from(*relocated);
                self.content_written += usize::from(*content);
                self.metadata_written += usize::from(*metadata);
            }
        }
    }

    fn progressed(&self) -> bool {
        self.relocated + self.content_written + self.metadata_written + self.deleted > 0
    }
}

/// What draining one item did.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Written {
        relocated: bool,
        content: bool,
        metadata: bool,
    },
    Deleted,
    Waiting,
    /// Removed by someone else before we got to it.
    Gone,
}

pub struct Writer {
    store: Arc<dyn MirrorStore>,
    blobs: Arc<dyn BlobStore>,
    source: Arc<dyn HierarchyProvider>,
    composer: AclComposer,
    feed: FeedHandle,
    locks: Arc<ItemLocks>,
    config: SyncConfig,
}

impl Writer {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        blobs: Arc<dyn BlobStore>,
        source: Arc<dyn HierarchyProvider>,
        feed: FeedHandle,
        locks: Arc<ItemLocks>,
        config: SyncConfig,
    ) -> Self {
        let composer = AclComposer::new(store.clone(), &config);
        Self {
            store,
            blobs,
            source,
            composer,
            feed,
            locks,
            config,
        }
    }

    pub fn composer(&self) -> &AclComposer {
        &self.composer
    }

    /// Drains every dirty item.
    ///
    /// Items are processed deepest first, concurrently within a depth. A
    /// deleted folder waits until its children are gone, so rounds repeat
    /// while they make progress. On failure the remaining items are still
    /// attempted and the first error is returned.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let mut total = DrainReport::default();
        loop {
            let round = self.drain_round().await?;
            total.relocated += round.relocated;
            total.content_written += round.content_written;
            total.metadata_written += round.metadata_written;
            total.deleted += round.deleted;
            total.waiting = round.waiting;
            if round.waiting == 0 || !round.progressed() {
                break;
            }
        }
        if total.waiting > 0 {
            warn!(waiting = total.waiting, "Deleted folders still have children");
        }
        if total != DrainReport::default() {
            info!(?total, "Drained dirty items");
        }
        Ok(total)
    }

    async fn drain_round(&self) -> SyncResult<DrainReport> {
        let mut by_depth: BTreeMap<usize, Vec<ItemId>> = BTreeMap::new();
        for item in self.store.dirty_items()? {
            by_depth.entry(depth(&item.location)).or_default().push(item.id);
        }

        let mut report = DrainReport::default();
        let mut first_error: Option<SyncError> = None;
        for (_, ids) in by_depth.into_iter().rev() {
            let results: Vec<(ItemId, SyncResult<Step>)> = stream::iter(ids)
                .map(|id| async move {
                    let result = self.drain_item(&id).await;
                    (id, result)
                })
                .buffer_unordered(self.config.worker_count.max(1))
                .collect()
                .await;

            for (id, result) in results {
                match result {
                    Ok(step) => report.record(&step),
                    Err(e) => {
                        error!(item_id = %id, error = %e, "Failed to drain item");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn drain_item(&self, id: &ItemId) -> SyncResult<Step> {
        let _guard = self.locks.item(id).await;
        let Some(mut item) = self.store.get_item(id)? else {
            return Ok(Step::Gone);
        };
        if item.deleted {
            return self.finalize_delete(&item).await;
        }

        let mut relocated = false;
        let mut content = false;
        let mut metadata = false;

        if item.relocation_pending() {
            self.move_artifacts(&item).await?;
            item.stored_location = Some(item.location.clone());
            self.store.upsert_item(&item)?;
            relocated = true;
        }

        if item.content_dirty {
            if item.is_file() {
                self.write_content(&item).await?;
            }
            item.content_dirty = false;
            item.stored_location = Some(item.location.clone());
            self.store.upsert_item(&item)?;
            content = true;
        }

        if item.metadata_dirty {
            item.published_acl = self.write_metadata(&item).await?;
            item.metadata_dirty = false;
            item.stored_location.get_or_insert_with(|| item.location.clone());
            self.store.upsert_item(&item)?;
            metadata = true;
        }

        Ok(Step::Written {
            relocated,
            content,
            metadata,
        })
    }

    async fn move_artifacts(&self, item: &Item) -> SyncResult<()> {
        let Some(stored) = &item.stored_location else {
            return Ok(());
        };
        if item.is_file() {
            let layout = &self.config.layout;
            self.blobs.rename(stored, &item.location).await?;
            self.blobs
                .rename(&layout.metadata_key(stored), &layout.metadata_key(&item.location))
                .await?;
        }
        debug!(item_id = %item.id, from = %stored, to = %item.location, "Moved stored artifacts");
        Ok(())
    }

    async fn write_content(&self, item: &Item) -> SyncResult<()> {
        match self.source.download(&item.id).await? {
            Some(bytes) => {
                let size = bytes.len();
                self.blobs.put(&item.location, bytes).await?;
                debug!(item_id = %item.id, key = %item.location, size, "Stored content");
            }
            None => {
                warn!(item_id = %item.id, "Content no longer available at the source");
            }
        }
        Ok(())
    }

    /// Writes the metadata document and the feed record. Returns the
    /// entries now published for the item.
    async fn write_metadata(&self, item: &Item) -> SyncResult<Vec<AclEntry>> {
        let layout = &self.config.layout;
        let acl = self.composer.compose(item)?;
        if item.is_file() {
            let doc = MetadataDocument::build(item, acl.clone(), &self.config);
            self.blobs
                .put(&layout.metadata_key(&item.location), doc.to_bytes()?)
                .await?;
        }
        self.feed
            .update_record(
                &layout.feed_key(&item.location),
                item.published_acl.clone(),
                acl.clone(),
            )
            .await?;
        debug!(item_id = %item.id, "Stored metadata");
        Ok(acl)
    }

    async fn finalize_delete(&self, item: &Item) -> SyncResult<Step> {
        if item.is_folder() {
            let children = self.store.children(&item.id)?;
            if !children.is_empty() {
                // Children created after the delete was applied go too.
                let stragglers: Vec<Item> = children
                    .into_iter()
                    .filter(|c| !c.deleted)
                    .map(|mut c| {
                        c.deleted = true;
                        c
                    })
                    .collect();
                if !stragglers.is_empty() {
                    self.store.upsert_items(&stragglers)?;
                }
                return Ok(Step::Waiting);
            }
        }

        let layout = &self.config.layout;
        if item.is_file() {
            let mut locations = vec![item.location.as_str()];
            if let Some(stored) = item.stored_location.as_deref().filter(|s| *s != item.location) {
                locations.push(stored);
            }
            for location in locations {
                self.blobs.delete(location).await?;
                self.blobs.delete(&layout.metadata_key(location)).await?;
            }
        }

        let feed_key = layout.feed_key(&item.location);
        if item.is_folder() {
            self.feed.remove_prefix(&feed_key).await?;
        } else {
            self.feed.remove_record(&feed_key).await?;
        }

        for collaboration in self.store.collaborations_for_item(&item.id)? {
            self.store.delete_collaboration(&collaboration.id)?;
        }
        self.store.delete_item(&item.id)?;
        info!(item_id = %item.id, location = %item.location, "Deleted item");
        Ok(Step::Deleted)
    }
}

/// Number of path segments, ignoring a folder's trailing `/`.
fn depth(location: &str) -> usize {
    location.trim_end_matches('/').matches('/').count()
}
