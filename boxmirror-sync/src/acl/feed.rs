//! The ACL feed document.
//!
//! Serialized as a JSON array of records:
//!
//! ```json
//! [{"keyPrefix": "s3://bucket/docs/0/1/",
//!   "aclEntries": [{"Name": "a@example.com", "Type": "USER", "Access": "ALLOW"}]}]
//! ```
//!
//! Every mutation is a targeted edit of existing records. Record order and
//! the order of untouched entries are preserved, so an unchanged ACL
//! serializes to identical bytes.

use crate::error::SyncResult;
use boxmirror_types::AclEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Grantees of one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(rename = "keyPrefix")]
    pub key_prefix: String,
    #[serde(rename = "aclEntries")]
    pub acl_entries: Vec<AclEntry>,
}

/// The whole feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclFeed {
    records: Vec<FeedRecord>,
}

impl AclFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Hex SHA-256 of the serialized document.
    pub fn digest(&self) -> SyncResult<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }

    pub fn records(&self) -> &[FeedRecord] {
        &self.records
    }

    pub fn get(&self, key: &str) -> Option<&FeedRecord> {
        self.records.iter().find(|r| r.key_prefix == key)
    }

    /// Brings this connector's entries at `key` in line with `entries`.
    ///
    /// `published` is what was last written for the key. Grantees in
    /// `published` but not in `entries` are deleted, entries whose access
    /// changed are updated in place, and new grantees are appended.
    /// Entries placed by anyone else are left alone. A record left without
    /// entries is removed. Returns whether anything changed.
    pub fn update_record(
        &mut self,
        key: &str,
        published: &[AclEntry],
        entries: &[AclEntry],
    ) -> bool {
        let Some(index) = self.records.iter().position(|r| r.key_prefix == key) else {
            if entries.is_empty() {
                return false;
            }
            self.records.push(FeedRecord {
                key_prefix: key.to_string(),
                acl_entries: entries.to_vec(),
            });
            return true;
        };
        let record = &mut self.records[index];

        let before = record.acl_entries.len();
        record.acl_entries.retain(|existing| {
            let withdrawn = published.iter().any(|p| p.same_grantee(existing))
                && !entries.iter().any(|e| e.same_grantee(existing));
            !withdrawn
        });
        let mut changed = record.acl_entries.len() != before;

        for entry in entries {
            match record.acl_entries.iter_mut().find(|e| e.same_grantee(entry)) {
                Some(existing) if existing.access != entry.access => {
                    existing.access = entry.access;
                    changed = true;
                }
                Some(_) => {}
                None => {
                    record.acl_entries.push(entry.clone());
                    changed = true;
                }
            }
        }

        if record.acl_entries.is_empty() {
            self.records.remove(index);
        }
        changed
    }

    /// Removes the record at exactly `key`.
    pub fn remove_record(&mut self, key: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.key_prefix != key);
        self.records.len() != before
    }

    /// Removes every record whose key starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| !r.key_prefix.starts_with(prefix));
        self.records.len() != before
    }

    /// Renames the record at exactly `from` to `to`.
    pub fn rename_record(&mut self, from: &str, to: &str) -> bool {
        self.rename_where(from, to, |key| key == from)
    }

    /// Renames every record under the `from` prefix to the `to` prefix.
    pub fn rename_prefix(&mut self, from: &str, to: &str) -> bool {
        self.rename_where(from, to, |key| key.starts_with(from))
    }

    /// Renames matching records. When the target key already has a
    /// record, the source entries are merged into it and the target's own
    /// entries win.
    fn rename_where(&mut self, from: &str, to: &str, matches: impl Fn(&str) -> bool) -> bool {
        if from == to {
            return false;
        }
        let (moving, mut kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| matches(&r.key_prefix));
        let changed = !moving.is_empty();

        for mut record in moving {
            record.key_prefix = format!("{to}{}", &record.key_prefix[from.len()..]);
            match kept.iter_mut().find(|r| r.key_prefix == record.key_prefix) {
                Some(target) => {
                    for entry in record.acl_entries {
                        if !target.acl_entries.iter().any(|e| e.same_grantee(&entry)) {
                            target.acl_entries.push(entry);
                        }
                    }
                }
                None => kept.push(record),
            }
        }
        self.records = kept;
        changed
    }
}
