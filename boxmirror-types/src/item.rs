//! Mirrored items and collaborations.

use crate::{Access, AclEntry, CollaborationId, Error, Grantee, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an item is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// An item's state as carried by a create notification, before it has a
/// storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    pub parent_id: Option<ItemId>,
    /// Folder ids from the root down to the direct parent, when the
    /// notification carries the hierarchy path.
    pub path: Option<Vec<ItemId>>,
    pub owner: Grantee,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A mirrored file or folder.
///
/// `location` is where the item's artifacts belong; `stored_location` is
/// where they were last confirmed to be written. The two differ while a
/// relocation (trash, restore, move) is pending.
///
/// `published_acl` holds the entries this connector last wrote to the
/// item's feed record. Only those are ever withdrawn from the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    pub parent_id: Option<ItemId>,
    pub owner: Grantee,
    pub location: String,
    pub stored_location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub trashed: bool,
    pub deleted: bool,
    pub content_dirty: bool,
    pub metadata_dirty: bool,
    #[serde(default)]
    pub published_acl: Vec<AclEntry>,
}

impl Item {
    /// Builds a fresh mirror row from a create notification.
    ///
    /// Files start content- and metadata-dirty; folders only metadata-dirty
    /// since they have no content of their own.
    pub fn from_snapshot(snapshot: ItemSnapshot, location: String) -> Self {
        let is_file = snapshot.kind == ItemKind::File;
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            name: snapshot.name,
            parent_id: snapshot.parent_id,
            owner: snapshot.owner,
            location,
            stored_location: None,
            created_at: snapshot.created_at,
            modified_at: snapshot.modified_at,
            trashed: false,
            deleted: false,
            content_dirty: is_file,
            metadata_dirty: true,
            published_acl: Vec::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Whether stored artifacts sit somewhere other than `location`.
    pub fn relocation_pending(&self) -> bool {
        matches!(&self.stored_location, Some(stored) if *stored != self.location)
    }

    /// Whether the writer has anything to do for this item.
    pub fn needs_drain(&self) -> bool {
        self.deleted || self.content_dirty || self.metadata_dirty || self.relocation_pending()
    }
}

/// Lifecycle of a collaboration invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl CollaborationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for CollaborationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::malformed(format!("unknown collaboration status: {other}"))),
        }
    }
}

/// An access grant on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: CollaborationId,
    pub item_id: ItemId,
    pub item_kind: ItemKind,
    pub grantee: Grantee,
    pub status: CollaborationStatus,
    /// Source collaborations always allow; deny grants come from other
    /// producers writing to the mirror.
    #[serde(default)]
    pub access: Access,
}

impl Collaboration {
    pub fn is_accepted(&self) -> bool {
        self.status == CollaborationStatus::Accepted
    }
}
