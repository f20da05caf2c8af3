//! Seeds the mirror by walking the source hierarchy.
//!
//! Every item found is fed through the synchronizer as a synthetic create
//! notification, followed by its accepted collaborations, so seeding and
//! live events share one code path.

use crate::error::SyncResult;
use crate::source::HierarchyProvider;
use crate::synchronizer::{Outcome, Synchronizer};
use boxmirror_types::{is_supported_file, ItemId, ItemKind, ItemSnapshot, Operation};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Counts from a crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub folders: usize,
    pub files: usize,
    pub collaborations: usize,
    /// Already mirrored and left alone.
    pub skipped: usize,
    /// Files outside the supported types.
    pub unsupported: usize,
}

pub struct Crawler {
    synchronizer: Arc<Synchronizer>,
    source: Arc<dyn HierarchyProvider>,
    page_limit: usize,
}

impl Crawler {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        source: Arc<dyn HierarchyProvider>,
        page_limit: usize,
    ) -> Self {
        Self {
            synchronizer,
            source,
            page_limit,
        }
    }

    /// Mirrors each root folder and everything below it.
    pub async fn crawl(&self, roots: &[ItemId]) -> SyncResult<CrawlReport> {
        let mut report = CrawlReport::default();
        let mut visited: HashSet<ItemId> = HashSet::new();

        for root in roots {
            let folder = self.source.folder(root).await?;
            self.seed(folder, &mut report).await?;

            let mut stack = vec![root.clone()];
            while let Some(folder_id) = stack.pop() {
                if !visited.insert(folder_id.clone()) {
                    continue;
                }
                for child in self
                    .source
                    .list_all_children(&folder_id, self.page_limit)
                    .await?
                {
                    if child.kind == ItemKind::Folder {
                        stack.push(child.id.clone());
                    }
                    self.seed(child, &mut report).await?;
                }
            }
        }

        info!(?report, "Crawl finished");
        Ok(report)
    }

    async fn seed(&self, snapshot: ItemSnapshot, report: &mut CrawlReport) -> SyncResult<()> {
        if snapshot.kind == ItemKind::File && !is_supported_file(&snapshot.name) {
            debug!(item_id = %snapshot.id, name = %snapshot.name, "Skipping unsupported file");
            report.unsupported += 1;
            return Ok(());
        }

        let (id, kind) = (snapshot.id.clone(), snapshot.kind);
        let outcome = self
            .synchronizer
            .apply(&Operation::ItemCreated(snapshot))
            .await?;
        if outcome == Outcome::Unchanged {
            report.skipped += 1;
            return Ok(());
        }
        match kind {
            ItemKind::File => report.files += 1,
            ItemKind::Folder => report.folders += 1,
        }

        for grant in self.source.list_collaborations(&id, kind).await? {
            if !grant.is_accepted() {
                continue;
            }
            self.synchronizer
                .apply(&Operation::CollaborationAccepted(grant))
                .await?;
            report.collaborations += 1;
        }
        Ok(())
    }
}
