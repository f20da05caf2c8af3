//! Core type definitions for the Box mirror connector.
//!
//! This crate defines the source-agnostic model shared by every other crate:
//! - Item and collaboration identifiers
//! - Mirrored items, collaborations and their lifecycle flags
//! - Grantees and ACL entries as the search index expects them
//! - Decoding of inbound change notifications into canonical operations
//! - The supported file-type table
//!
//! Nothing here performs I/O.

mod event;
mod file_type;
mod grantee;
mod ids;
mod item;

pub use event::{IgnoreReason, Notification, Operation, Trigger, TriggerAction, TriggerGroup};
pub use file_type::{content_type, extension, is_supported_file, SUPPORTED_FILE_TYPES};
pub use grantee::{Access, AclEntry, Grantee, GranteeType};
pub use ids::{CollaborationId, ItemId};
pub use item::{Collaboration, CollaborationStatus, Item, ItemKind, ItemSnapshot};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding notifications.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required field is missing or has the wrong shape.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unknown item kind: {0}")]
    UnknownKind(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }
}
