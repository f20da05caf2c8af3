//! Single-writer access to the ACL feed.
//!
//! The feed is one shared document that every ACL change read-modify-writes.
//! All mutations go through one task that owns the loaded document, so two
//! items can never interleave their edits. The document is written back
//! only when its digest changed.

use super::feed::AclFeed;
use crate::error::{SyncError, SyncResult};
use boxmirror_blobstore::BlobStore;
use boxmirror_types::AclEntry;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<SyncResult<T>>;

/// Command sent to the feed task.
enum FeedCommand {
    Update {
        key: String,
        published: Vec<AclEntry>,
        entries: Vec<AclEntry>,
        reply: Reply<()>,
    },
    RemoveRecord {
        key: String,
        reply: Reply<()>,
    },
    RemovePrefix {
        prefix: String,
        reply: Reply<()>,
    },
    RenameRecord {
        from: String,
        to: String,
        reply: Reply<()>,
    },
    RenamePrefix {
        from: String,
        to: String,
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<AclFeed>,
    },
}

/// Cloneable handle to the feed task. The task stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    /// Spawns the feed task for the document stored at `key`.
    ///
    /// The document is loaded lazily on the first command.
    pub fn spawn(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let actor = FeedActor {
            blobs,
            key: key.into(),
            feed: None,
            saved_digest: None,
            rx,
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    /// Moves the grantees this connector published at `key` from
    /// `published` to `entries` by targeted edits.
    pub async fn update_record(
        &self,
        key: &str,
        published: Vec<AclEntry>,
        entries: Vec<AclEntry>,
    ) -> SyncResult<()> {
        self.request(|reply| FeedCommand::Update {
            key: key.to_string(),
            published,
            entries,
            reply,
        })
        .await
    }

    pub async fn remove_record(&self, key: &str) -> SyncResult<()> {
        self.request(|reply| FeedCommand::RemoveRecord {
            key: key.to_string(),
            reply,
        })
        .await
    }

    pub async fn remove_prefix(&self, prefix: &str) -> SyncResult<()> {
        self.request(|reply| FeedCommand::RemovePrefix {
            prefix: prefix.to_string(),
            reply,
        })
        .await
    }

    pub async fn rename_record(&self, from: &str, to: &str) -> SyncResult<()> {
        self.request(|reply| FeedCommand::RenameRecord {
            from: from.to_string(),
            to: to.to_string(),
            reply,
        })
        .await
    }

    pub async fn rename_prefix(&self, from: &str, to: &str) -> SyncResult<()> {
        self.request(|reply| FeedCommand::RenamePrefix {
            from: from.to_string(),
            to: to.to_string(),
            reply,
        })
        .await
    }

    /// A copy of the current document.
    pub async fn snapshot(&self) -> SyncResult<AclFeed> {
        self.request(|reply| FeedCommand::Snapshot { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> FeedCommand) -> SyncResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }
}

struct FeedActor {
    blobs: Arc<dyn BlobStore>,
    key: String,
    feed: Option<AclFeed>,
    /// Digest of the document as last read or written.
    saved_digest: Option<String>,
    rx: mpsc::Receiver<FeedCommand>,
}

impl FeedActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        debug!(key = %self.key, "ACL feed task stopped");
    }

    async fn handle(&mut self, command: FeedCommand) {
        // A dropped reply receiver only means the caller gave up waiting.
        match command {
            FeedCommand::Update {
                key,
                published,
                entries,
                reply,
            } => {
                let result = self
                    .mutate(|feed| feed.update_record(&key, &published, &entries))
                    .await;
                let _ = reply.send(result);
            }
            FeedCommand::RemoveRecord { key, reply } => {
                let result = self.mutate(|feed| feed.remove_record(&key)).await;
                let _ = reply.send(result);
            }
            FeedCommand::RemovePrefix { prefix, reply } => {
                let result = self.mutate(|feed| feed.remove_prefix(&prefix)).await;
                let _ = reply.send(result);
            }
            FeedCommand::RenameRecord { from, to, reply } => {
                let result = self.mutate(|feed| feed.rename_record(&from, &to)).await;
                let _ = reply.send(result);
            }
            FeedCommand::RenamePrefix { from, to, reply } => {
                let result = self.mutate(|feed| feed.rename_prefix(&from, &to)).await;
                let _ = reply.send(result);
            }
            FeedCommand::Snapshot { reply } => {
                let result = self.load().await.map(|feed| feed.clone());
                let _ = reply.send(result);
            }
        }
    }

    async fn load(&mut self) -> SyncResult<&mut AclFeed> {
        if self.feed.is_none() {
            let feed = match self.blobs.get(&self.key).await? {
                Some(bytes) => {
                    let feed = AclFeed::from_bytes(&bytes)?;
                    self.saved_digest = Some(feed.digest()?);
                    feed
                }
                None => AclFeed::new(),
            };
            debug!(key = %self.key, records = feed.records().len(), "Loaded ACL feed");
            self.feed = Some(feed);
        }
        Ok(self.feed.get_or_insert_with(AclFeed::new))
    }

    async fn mutate(&mut self, op: impl FnOnce(&mut AclFeed) -> bool) -> SyncResult<()> {
        let changed = op(self.load().await?);
        if changed {
            debug!(key = %self.key, "ACL feed modified");
        }
        // Also retries a save that failed after an earlier in-memory edit.
        self.persist().await
    }

    async fn persist(&mut self) -> SyncResult<()> {
        let Some(feed) = &self.feed else {
            return Ok(());
        };
        let bytes = feed.to_bytes()?;
        let digest = hex::encode(Sha256::digest(&bytes));
        if self.saved_digest.as_deref() == Some(digest.as_str()) {
            return Ok(());
        }
        if self.saved_digest.is_none() && feed.records().is_empty() {
            return Ok(());
        }
        let records = feed.records().len();
        if let Err(e) = self.blobs.put(&self.key, bytes).await {
            warn!(key = %self.key, error = %e, "Failed to save ACL feed");
            return Err(e.into());
        }
        info!(key = %self.key, records, "Saved ACL feed");
        self.saved_digest = Some(digest);
        Ok(())
    }
}
