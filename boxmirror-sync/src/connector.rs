//! The queue-driven connector loop.
//!
//! A batch is received, every message is decoded and applied, then the
//! writer drains the mirror. Messages are acknowledged only once the drain
//! succeeded, so a failure anywhere leaves them to be redelivered.

use crate::acl::FeedHandle;
use crate::config::SyncConfig;
use crate::crawler::{CrawlReport, Crawler};
use crate::error::{SyncError, SyncResult};
use crate::locks::ItemLocks;
use crate::queue::{MessageQueue, QueueMessage};
use crate::source::HierarchyProvider;
use crate::synchronizer::{Outcome, Synchronizer};
use crate::writer::{DrainReport, Writer};
use boxmirror_blobstore::BlobStore;
use boxmirror_storage::MirrorStore;
use boxmirror_types::{ItemId, Notification};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counts from one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub deferred: usize,
    /// Soft failures (item not mirrored) that were logged and acknowledged.
    pub soft_failures: usize,
    /// Messages left for redelivery.
    pub failed: usize,
    pub acked: usize,
}

impl BatchReport {
    fn add(&mut self, other: &BatchReport) {
        self.received += other.received;
        self.applied += other.applied;
        self.unchanged += other.unchanged;
        self.ignored += other.ignored;
        self.deferred += other.deferred;
        self.soft_failures += other.soft_failures;
        self.failed += other.failed;
        self.acked += other.acked;
    }
}

/// How one message ended.
enum Handled {
    Done(Outcome),
    SoftFailure,
}

/// Wires the mirror, object store, source and queue together.
pub struct Connector {
    synchronizer: Arc<Synchronizer>,
    writer: Writer,
    source: Arc<dyn HierarchyProvider>,
    queue: Arc<dyn MessageQueue>,
    feed: FeedHandle,
    config: SyncConfig,
}

impl Connector {
    /// Builds a connector and spawns its ACL feed task.
    pub fn new(
        store: Arc<dyn MirrorStore>,
        blobs: Arc<dyn BlobStore>,
        source: Arc<dyn HierarchyProvider>,
        queue: Arc<dyn MessageQueue>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        let feed = FeedHandle::spawn(blobs.clone(), config.layout.acl_feed_key.clone());
        let locks = Arc::new(ItemLocks::new());
        let synchronizer = Arc::new(Synchronizer::new(
            store.clone(),
            feed.clone(),
            locks.clone(),
            config.clone(),
        ));
        let writer = Writer::new(
            store,
            blobs,
            source.clone(),
            feed.clone(),
            locks,
            config.clone(),
        );
        Ok(Self {
            synchronizer,
            writer,
            source,
            queue,
            feed,
            config,
        })
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn feed(&self) -> &FeedHandle {
        &self.feed
    }

    /// Processes batches until the queue returns an empty one.
    pub async fn run_until_empty(&self) -> SyncResult<BatchReport> {
        let mut total = BatchReport::default();
        loop {
            let messages = self.queue.receive(self.config.batch_size).await?;
            if messages.is_empty() {
                if total.received == 0 {
                    info!("There were no messages");
                }
                break;
            }
            let report = self.process_batch(messages).await?;
            info!("{} messages have been completed", report.acked);
            total.add(&report);
        }
        Ok(total)
    }

    /// Applies a batch, drains, and acknowledges what was handled.
    ///
    /// Messages about the same item are applied in arrival order; distinct
    /// items run concurrently.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> SyncResult<BatchReport> {
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };

        let groups = group_by_subject(messages);
        let results: Vec<Vec<(QueueMessage, SyncResult<Handled>)>> = stream::iter(groups)
            .map(|group| async move {
                let mut out = Vec::with_capacity(group.len());
                for message in group {
                    let result = self.handle(&message).await;
                    out.push((message, result));
                }
                out
            })
            .buffer_unordered(self.config.worker_count.max(1))
            .collect()
            .await;

        let mut handled = Vec::new();
        for (message, result) in results.into_iter().flatten() {
            match result {
                Ok(Handled::Done(outcome)) => {
                    match outcome {
                        Outcome::Applied => report.applied += 1,
                        Outcome::Unchanged => report.unchanged += 1,
                        Outcome::Ignored(_) => report.ignored += 1,
                        Outcome::Deferred => report.deferred += 1,
                    }
                    handled.push(message);
                }
                Ok(Handled::SoftFailure) => {
                    report.soft_failures += 1;
                    handled.push(message);
                }
                Err(_) => report.failed += 1,
            }
        }

        if let Err(e) = self.writer.drain().await {
            error!(error = %e, "Drain failed, leaving batch for redelivery");
            report.failed += handled.len();
            return Ok(report);
        }

        for message in handled {
            self.queue.ack(&message.receipt).await?;
            report.acked += 1;
        }
        debug!(?report, "Batch processed");
        Ok(report)
    }

    /// Drains without consuming the queue.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        self.writer.drain().await
    }

    /// Seeds the mirror from the configured root folders, then drains.
    pub async fn crawl(&self, page_limit: usize) -> SyncResult<(CrawlReport, DrainReport)> {
        let crawler = Crawler::new(self.synchronizer.clone(), self.source.clone(), page_limit);
        let crawled = crawler.crawl(&self.config.root_folder_ids).await?;
        let drained = self.writer.drain().await?;
        Ok((crawled, drained))
    }

    async fn handle(&self, message: &QueueMessage) -> SyncResult<Handled> {
        let op = match Notification::parse(&message.body).and_then(|n| n.normalize()) {
            Ok(op) => op,
            Err(e) => {
                error!(payload = %message.body, error = %e, "Malformed notification");
                return Err(SyncError::Malformed(e));
            }
        };

        match self.synchronizer.apply(&op).await {
            Ok(outcome) => Ok(Handled::Done(outcome)),
            Err(e) if e.is_soft() => {
                warn!(payload = %message.body, error = %e, "Notification refers to unknown state, skipping");
                Ok(Handled::SoftFailure)
            }
            Err(e) => {
                error!(
                    payload = %message.body,
                    error = %e,
                    redeliverable = e.is_redeliverable(),
                    "Failed to apply notification"
                );
                Err(e)
            }
        }
    }
}

/// Splits messages into per-item groups, preserving arrival order within
/// each group. Undecodable messages and those without a subject form
/// their own groups.
fn group_by_subject(messages: Vec<QueueMessage>) -> Vec<Vec<QueueMessage>> {
    let mut groups: Vec<Vec<QueueMessage>> = Vec::new();
    let mut index: HashMap<ItemId, usize> = HashMap::new();
    for message in messages {
        let subject = Notification::parse(&message.body)
            .and_then(|n| n.normalize())
            .ok()
            .and_then(|op| op.subject().cloned());
        match subject {
            Some(id) => match index.get(&id) {
                Some(&i) => groups[i].push(message),
                None => {
                    index.insert(id, groups.len());
                    groups.push(vec![message]);
                }
            },
            None => groups.push(vec![message]),
        }
    }
    groups
}
