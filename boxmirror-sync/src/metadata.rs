//! The per-document metadata file read by the search index.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use boxmirror_types::{content_type, AclEntry, Item};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Index attributes of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(rename = "_created_at", skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<String>,
    #[serde(rename = "_last_updated_at", skip_serializing_if = "Option::is_none", default)]
    pub last_updated_at: Option<String>,
    #[serde(rename = "_source_uri")]
    pub source_uri: String,
}

/// `{DocumentId, Attributes, Title, ContentType?, AccessControlList?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataDocument {
    pub document_id: String,
    pub attributes: Attributes,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_control_list: Option<Vec<AclEntry>>,
}

impl MetadataDocument {
    /// Builds the metadata for a mirrored item with its composed ACL.
    pub fn build(item: &Item, acl: Vec<AclEntry>, config: &SyncConfig) -> Self {
        Self {
            document_id: item.id.to_string(),
            attributes: Attributes {
                created_at: item.created_at.map(format_timestamp),
                last_updated_at: item.modified_at.map(format_timestamp),
                source_uri: source_uri(&config.source_uri_prefix, item),
            },
            title: item.name.clone(),
            content_type: item.is_file().then(|| content_type(&item.name).to_string()),
            access_control_list: (!acl.is_empty()).then_some(acl),
        }
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `https://app.box.com/file/10`, `https://app.box.com/folder/1`.
pub fn source_uri(prefix: &str, item: &Item) -> String {
    let sep = if prefix.ends_with('/') { "" } else { "/" };
    format!("{prefix}{sep}{}/{}", item.kind, item.id)
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
