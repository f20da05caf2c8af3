//! Event-driven Box mirror synchronizer.
//!
//! Keeps an object-store mirror of a Box hierarchy current from change
//! notifications, together with a metadata document per file and a shared
//! ACL feed that tells the search index who may see each key prefix.
//!
//! # Architecture
//!
//! Work is split into two phases:
//!
//! 1. **Apply**: the [`Synchronizer`] turns each canonical operation into
//!    mirror-state changes, marking affected items dirty. Subtree changes
//!    go through the [`Propagator`].
//! 2. **Drain**: the [`Writer`] walks dirty items deepest-first and brings
//!    the object store in line: relocations, content, metadata documents,
//!    feed records and final deletion.
//!
//! The [`Connector`] ties both phases to a [`MessageQueue`], acknowledging
//! messages only after a successful drain so failures are redelivered.
//!
//! # Example
//!
//! ```no_run
//! use boxmirror_blobstore::MemoryBlobStore;
//! use boxmirror_storage::SqliteMirrorStore;
//! use boxmirror_sync::{Connector, MemoryQueue, StaticHierarchy, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> boxmirror_sync::SyncResult<()> {
//! let mut config = SyncConfig::default();
//! config.layout.bucket = "bucket".into();
//! let store = Arc::new(SqliteMirrorStore::open_in_memory()?);
//! let connector = Connector::new(
//!     store,
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(StaticHierarchy::new()),
//!     Arc::new(MemoryQueue::new()),
//!     config,
//! )?;
//! connector.run_until_empty().await?;
//! # Ok(())
//! # }
//! ```

pub mod acl;
pub mod config;
mod connector;
mod crawler;
mod error;
pub mod layout;
mod locks;
pub mod metadata;
mod propagator;
pub mod queue;
pub mod source;
mod synchronizer;
mod writer;

pub use acl::{AclComposer, AclFeed, FeedHandle, FeedRecord};
pub use config::{KeyStyle, StorageLayout, SyncConfig, Traversal};
pub use connector::{BatchReport, Connector};
pub use crawler::{CrawlReport, Crawler};
pub use error::{SyncError, SyncResult};
pub use locks::{ItemGuard, ItemLocks, TreeGuard};
pub use metadata::{Attributes, MetadataDocument};
pub use propagator::Propagator;
pub use queue::{MemoryQueue, MessageQueue, QueueMessage};
pub use source::{BoxClient, BoxClientConfig, ChildPage, HierarchyProvider, StaticHierarchy};
pub use synchronizer::{Outcome, Synchronizer};
pub use writer::{DrainReport, Writer};
