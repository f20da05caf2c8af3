//! Inbound change notifications and their canonical operations.
//!
//! A notification is `{"trigger": "<GROUP>.<ACTION>", "source": {...}}`.
//! It is decoded once, at the boundary, into an [`Operation`]; the rest of
//! the system only ever matches on the enum.

use crate::file_type::is_supported_file;
use crate::{
    Access, Collaboration, CollaborationId, CollaborationStatus, Error, Grantee, ItemId, ItemKind,
    ItemSnapshot, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event group, the part of the trigger before the dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerGroup {
    File,
    Folder,
    Collaboration,
    Other(String),
}

/// Event action, the part of the trigger after the dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerAction {
    Uploaded,
    Created,
    Trashed,
    Restored,
    Deleted,
    Moved,
    Renamed,
    Copied,
    Accepted,
    Removed,
    Updated,
    Other(String),
}

/// A parsed `<GROUP>.<ACTION>` trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub group: TriggerGroup,
    pub action: TriggerAction,
}

impl FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (group, action) = s
            .split_once('.')
            .ok_or_else(|| Error::malformed(format!("trigger without action: {s:?}")))?;

        let group = match group {
            "FILE" => TriggerGroup::File,
            "FOLDER" => TriggerGroup::Folder,
            "COLLABORATION" => TriggerGroup::Collaboration,
            other => TriggerGroup::Other(other.to_string()),
        };
        let action = match action {
            "UPLOADED" => TriggerAction::Uploaded,
            "CREATED" => TriggerAction::Created,
            "TRASHED" => TriggerAction::Trashed,
            "RESTORED" => TriggerAction::Restored,
            "DELETED" => TriggerAction::Deleted,
            "MOVED" => TriggerAction::Moved,
            "RENAMED" => TriggerAction::Renamed,
            "COPIED" => TriggerAction::Copied,
            "ACCEPTED" => TriggerAction::Accepted,
            "REMOVED" => TriggerAction::Removed,
            "UPDATED" => TriggerAction::Updated,
            other => TriggerAction::Other(other.to_string()),
        };
        Ok(Self { group, action })
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = match &self.group {
            TriggerGroup::File => "FILE",
            TriggerGroup::Folder => "FOLDER",
            TriggerGroup::Collaboration => "COLLABORATION",
            TriggerGroup::Other(s) => s,
        };
        let action = match &self.action {
            TriggerAction::Uploaded => "UPLOADED",
            TriggerAction::Created => "CREATED",
            TriggerAction::Trashed => "TRASHED",
            TriggerAction::Restored => "RESTORED",
            TriggerAction::Deleted => "DELETED",
            TriggerAction::Moved => "MOVED",
            TriggerAction::Renamed => "RENAMED",
            TriggerAction::Copied => "COPIED",
            TriggerAction::Accepted => "ACCEPTED",
            TriggerAction::Removed => "REMOVED",
            TriggerAction::Updated => "UPDATED",
            TriggerAction::Other(s) => s,
        };
        write!(f, "{group}.{action}")
    }
}

/// Why a notification was accepted but deliberately not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The file's extension is outside the supported-type allow-list.
    UnsupportedFileType(String),
    /// A trigger this connector does not mirror (previews, locks, ...).
    UnhandledTrigger,
}

/// Canonical operation derived from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ItemCreated(ItemSnapshot),
    ItemTrashed {
        id: ItemId,
        kind: ItemKind,
    },
    ItemRestored {
        id: ItemId,
        kind: ItemKind,
    },
    ItemDeleted {
        id: ItemId,
        kind: ItemKind,
    },
    ItemMoved {
        id: ItemId,
        kind: ItemKind,
        parent_id: Option<ItemId>,
        path: Option<Vec<ItemId>>,
    },
    ItemRenamed {
        id: ItemId,
        kind: ItemKind,
        name: String,
    },
    /// A follow-up create notification covers the copy.
    ItemCopied {
        id: ItemId,
        kind: ItemKind,
    },
    /// Invitations carry no confirmed identity yet.
    CollaborationCreated {
        id: CollaborationId,
    },
    CollaborationAccepted(Collaboration),
    CollaborationRemoved {
        id: CollaborationId,
        item_id: Option<ItemId>,
    },
    /// Every role can read, so role changes do not affect the ACL.
    CollaborationUpdated {
        id: CollaborationId,
    },
    Ignored {
        trigger: String,
        reason: IgnoreReason,
    },
}

impl Operation {
    /// The item whose mirror record this operation mutates, used to
    /// serialize work per item.
    pub fn subject(&self) -> Option<&ItemId> {
        match self {
            Self::ItemCreated(snapshot) => Some(&snapshot.id),
            Self::ItemTrashed { id, .. }
            | Self::ItemRestored { id, .. }
            | Self::ItemDeleted { id, .. }
            | Self::ItemMoved { id, .. }
            | Self::ItemRenamed { id, .. }
            | Self::ItemCopied { id, .. } => Some(id),
            Self::CollaborationAccepted(grant) => Some(&grant.item_id),
            Self::CollaborationRemoved { item_id, .. } => item_id.as_ref(),
            Self::CollaborationCreated { .. }
            | Self::CollaborationUpdated { .. }
            | Self::Ignored { .. } => None,
        }
    }

    /// Short name used in log records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ItemCreated(_) => "ItemCreated",
            Self::ItemTrashed { .. } => "ItemTrashed",
            Self::ItemRestored { .. } => "ItemRestored",
            Self::ItemDeleted { .. } => "ItemDeleted",
            Self::ItemMoved { .. } => "ItemMoved",
            Self::ItemRenamed { .. } => "ItemRenamed",
            Self::ItemCopied { .. } => "ItemCopied",
            Self::CollaborationCreated { .. } => "CollaborationCreated",
            Self::CollaborationAccepted(_) => "CollaborationAccepted",
            Self::CollaborationRemoved { .. } => "CollaborationRemoved",
            Self::CollaborationUpdated { .. } => "CollaborationUpdated",
            Self::Ignored { .. } => "Ignored",
        }
    }
}

// ── Wire shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRef {
    id: ItemId,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPathCollection {
    #[serde(default)]
    entries: Vec<RawRef>,
}

#[derive(Debug, Deserialize)]
struct RawAccessible {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItemSource {
    id: ItemId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent: Option<RawRef>,
    #[serde(default)]
    path_collection: Option<RawPathCollection>,
    #[serde(default)]
    owned_by: Option<RawAccessible>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCollaborationSource {
    id: CollaborationId,
    #[serde(default)]
    item: Option<RawRef>,
    #[serde(default)]
    accessible_by: Option<RawAccessible>,
    #[serde(default)]
    status: Option<String>,
}

/// An inbound change notification as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub trigger: String,
    pub source: serde_json::Value,
}

impl Notification {
    /// Parses a queue message body.
    pub fn parse(body: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if value.get("trigger").and_then(|t| t.as_str()).is_none() {
            return Err(Error::malformed("missing trigger"));
        }
        if value.get("source").is_none_or(|s| !s.is_object()) {
            return Err(Error::malformed("missing source object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn trigger(&self) -> Result<Trigger> {
        self.trigger.parse()
    }

    /// Decodes this notification into its canonical operation.
    pub fn normalize(&self) -> Result<Operation> {
        let trigger = self.trigger()?;
        let kind = match &trigger.group {
            TriggerGroup::File => ItemKind::File,
            TriggerGroup::Folder => ItemKind::Folder,
            TriggerGroup::Collaboration => return self.normalize_collaboration(&trigger),
            TriggerGroup::Other(_) => return Ok(self.ignored()),
        };

        let source: RawItemSource = self.decode_source()?;
        let id = source.id.clone();

        let op = match trigger.action {
            TriggerAction::Uploaded | TriggerAction::Created => {
                let snapshot = snapshot_from(kind, source)?;
                if kind == ItemKind::File && !is_supported_file(&snapshot.name) {
                    return Ok(Operation::Ignored {
                        trigger: self.trigger.clone(),
                        reason: IgnoreReason::UnsupportedFileType(snapshot.name),
                    });
                }
                Operation::ItemCreated(snapshot)
            }
            TriggerAction::Trashed => Operation::ItemTrashed { id, kind },
            TriggerAction::Restored => Operation::ItemRestored { id, kind },
            TriggerAction::Deleted => Operation::ItemDeleted { id, kind },
            TriggerAction::Moved => {
                let path = source.path_collection.map(folder_path);
                let parent_id = source.parent.map(|p| p.id);
                if path.is_none() && parent_id.is_none() {
                    return Err(Error::malformed("move without parent or path_collection"));
                }
                Operation::ItemMoved {
                    id,
                    kind,
                    parent_id,
                    path,
                }
            }
            TriggerAction::Renamed => {
                let name = source
                    .name
                    .ok_or_else(|| Error::malformed("rename without name"))?;
                Operation::ItemRenamed { id, kind, name }
            }
            TriggerAction::Copied => Operation::ItemCopied { id, kind },
            _ => self.ignored(),
        };
        Ok(op)
    }

    fn normalize_collaboration(&self, trigger: &Trigger) -> Result<Operation> {
        let source: RawCollaborationSource = self.decode_source()?;
        let op = match trigger.action {
            TriggerAction::Created => Operation::CollaborationCreated { id: source.id },
            TriggerAction::Updated => Operation::CollaborationUpdated { id: source.id },
            TriggerAction::Removed => Operation::CollaborationRemoved {
                id: source.id,
                item_id: source.item.map(|i| i.id),
            },
            TriggerAction::Accepted => {
                let (grant, item_name) = collaboration_from(source)?;
                if grant.item_kind == ItemKind::File && !is_supported_file(&item_name) {
                    return Ok(Operation::Ignored {
                        trigger: self.trigger.clone(),
                        reason: IgnoreReason::UnsupportedFileType(item_name),
                    });
                }
                Operation::CollaborationAccepted(grant)
            }
            _ => self.ignored(),
        };
        Ok(op)
    }

    fn decode_source<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.source.clone())
            .map_err(|e| Error::malformed(format!("invalid source for {}: {e}", self.trigger)))
    }

    fn ignored(&self) -> Operation {
        Operation::Ignored {
            trigger: self.trigger.clone(),
            reason: IgnoreReason::UnhandledTrigger,
        }
    }
}

impl ItemSnapshot {
    /// Decodes an item object as the source API returns it (folder
    /// listings use the same shape as notification sources).
    pub fn from_source(kind: ItemKind, source: &serde_json::Value) -> Result<Self> {
        let raw: RawItemSource = serde_json::from_value(source.clone())
            .map_err(|e| Error::malformed(format!("invalid {kind} object: {e}")))?;
        snapshot_from(kind, raw)
    }
}

impl Collaboration {
    /// Decodes a collaboration object as the source API returns it.
    pub fn from_source(source: &serde_json::Value) -> Result<Self> {
        let raw: RawCollaborationSource = serde_json::from_value(source.clone())
            .map_err(|e| Error::malformed(format!("invalid collaboration object: {e}")))?;
        collaboration_from(raw).map(|(grant, _)| grant)
    }
}

/// Returns the grant together with the item's display name, which the
/// caller needs for the file-type filter.
fn collaboration_from(source: RawCollaborationSource) -> Result<(Collaboration, String)> {
    let item = source
        .item
        .ok_or_else(|| Error::malformed("collaboration without item"))?;
    let item_kind: ItemKind = item
        .kind
        .as_deref()
        .ok_or_else(|| Error::malformed("collaboration item without type"))?
        .parse()?;
    let grantee = source
        .accessible_by
        .as_ref()
        .and_then(grantee_from)
        .ok_or_else(|| Error::malformed("collaboration without accessible_by"))?;
    let status = match source.status.as_deref() {
        Some(s) => s.parse()?,
        None => CollaborationStatus::Accepted,
    };
    let grant = Collaboration {
        id: source.id,
        item_id: item.id,
        item_kind,
        grantee,
        status,
        access: Access::Allow,
    };
    Ok((grant, item.name.unwrap_or_default()))
}

fn snapshot_from(kind: ItemKind, source: RawItemSource) -> Result<ItemSnapshot> {
    let name = source
        .name
        .ok_or_else(|| Error::malformed("item without name"))?;
    let owner = source
        .owned_by
        .as_ref()
        .and_then(grantee_from)
        .ok_or_else(|| Error::malformed("item without owned_by"))?;

    Ok(ItemSnapshot {
        id: source.id,
        kind,
        name,
        parent_id: source.parent.map(|p| p.id),
        path: source.path_collection.map(folder_path),
        owner,
        created_at: parse_timestamp(source.created_at.as_deref())?,
        modified_at: parse_timestamp(source.modified_at.as_deref())?,
    })
}

fn folder_path(collection: RawPathCollection) -> Vec<ItemId> {
    collection
        .entries
        .into_iter()
        .filter(|e| e.kind.as_deref().is_none_or(|k| k == "folder"))
        .map(|e| e.id)
        .collect()
}

fn grantee_from(raw: &RawAccessible) -> Option<Grantee> {
    Grantee::from_source(&raw.kind, raw.login.as_deref(), raw.name.as_deref())
}

fn parse_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::InvalidTimestamp(format!("{s}: {e}")))
        })
        .transpose()
}
