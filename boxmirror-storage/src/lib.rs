//! Mirror store for the Box mirror connector.
//!
//! Persists mirrored items and collaborations with their hierarchy links.
//! The hierarchy is an explicit table keyed by item id; parents are
//! referenced by id only, never embedded.
//!
//! # Architecture
//!
//! - [`MirrorStore`] is the logical contract the synchronizer and writer use
//! - [`SqliteMirrorStore`] implements it on a single SQLite connection
//! - Every mutating call runs in its own transaction, so a batch of
//!   propagated updates either lands completely or not at all

mod error;
mod mirror;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use mirror::MirrorStore;
pub use sqlite::SqliteMirrorStore;
