//! Object key construction.
//!
//! An item's location is its content key. Folders have no content, but
//! their location ends with `/` so it doubles as the key prefix of their
//! subtree. Metadata sits next to the content under a fixed suffix, and
//! the ACL feed addresses locations as `s3://<bucket>/<key>`.

use crate::config::{KeyStyle, StorageLayout};
use boxmirror_types::{ItemId, ItemKind};

impl StorageLayout {
    /// Location of an item in the document namespace, given the ids of its
    /// ancestor folders from the top down.
    pub fn location_for(&self, id: &ItemId, kind: ItemKind, ancestors: &[ItemId]) -> String {
        let mut key = self.document_prefix.clone();
        if self.key_style == KeyStyle::Hierarchical {
            for ancestor in ancestors {
                key.push_str(ancestor.as_str());
                key.push('/');
            }
        }
        key.push_str(id.as_str());
        if kind == ItemKind::Folder {
            key.push('/');
        }
        key
    }

    /// Location of an item directly below a folder at `parent_location`.
    pub fn location_under(&self, parent_location: &str, id: &ItemId, kind: ItemKind) -> String {
        if self.key_style == KeyStyle::Flat {
            return self.location_for(id, kind, &[]);
        }
        let mut key = self.to_document(parent_location);
        if !key.ends_with('/') {
            key.push('/');
        }
        key.push_str(id.as_str());
        if kind == ItemKind::Folder {
            key.push('/');
        }
        key
    }

    pub fn metadata_key(&self, location: &str) -> String {
        format!("{location}{}", self.metadata_suffix)
    }

    pub fn is_trashed(&self, location: &str) -> bool {
        location.starts_with(&self.trashed_prefix)
    }

    /// Moves a location into the trashed namespace. Already-trashed
    /// locations are returned unchanged.
    pub fn to_trashed(&self, location: &str) -> String {
        swap_prefix(location, &self.document_prefix, &self.trashed_prefix)
    }

    /// Moves a location back into the document namespace.
    pub fn to_document(&self, location: &str) -> String {
        swap_prefix(location, &self.trashed_prefix, &self.document_prefix)
    }

    /// Feed key for a location. Trashed locations map to their document
    /// form, so trashing an item never moves its feed record.
    pub fn feed_key(&self, location: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.to_document(location))
    }
}

fn swap_prefix(location: &str, from: &str, to: &str) -> String {
    match location.strip_prefix(from) {
        Some(rest) => format!("{to}{rest}"),
        None => location.to_string(),
    }
}

/// Replaces `from` with `to` at the start of `location`, if it matches.
pub fn rebase(location: &str, from: &str, to: &str) -> Option<String> {
    location
        .strip_prefix(from)
        .map(|rest| format!("{to}{rest}"))
}
