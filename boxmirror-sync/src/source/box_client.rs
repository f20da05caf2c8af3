//! Box REST API client.
//!
//! Uses the Box Content API v2.0 with a bearer token obtained elsewhere.

use super::provider::{ChildPage, HierarchyProvider};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use boxmirror_types::{Collaboration, ItemId, ItemKind, ItemSnapshot};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Item fields requested from the API, matching what notifications carry.
const ITEM_FIELDS: &str = "id,type,name,parent,path_collection,owned_by,created_at,modified_at";

/// Box API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxClientConfig {
    /// Base URL for the Box API (e.g. `https://api.box.com/2.0`).
    pub api_base_url: String,
    /// Bearer token.
    pub access_token: String,
    /// Page size for folder listings.
    pub page_limit: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for BoxClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.box.com/2.0".to_string(),
            access_token: String::new(),
            page_limit: 1000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntryList {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Box API client.
pub struct BoxClient {
    config: BoxClientConfig,
    client: Client,
}

impl BoxClient {
    pub fn new(config: BoxClientConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BoxClientConfig {
        &self.config
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> SyncResult<Response> {
        self.client
            .get(format!("{}{path}", self.config.api_base_url))
            .bearer_auth(&self.config.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("GET {path} failed: {e}")))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let response = check_status(path, self.get(path, query).await?).await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("failed to parse {path}: {e}")))
    }
}

async fn check_status(path: &str, response: Response) -> SyncResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Network(format!("GET {path} failed: {status} {body}")))
}

fn collaborations_path(id: &ItemId, kind: ItemKind) -> String {
    match kind {
        ItemKind::File => format!("/files/{id}/collaborations"),
        ItemKind::Folder => format!("/folders/{id}/collaborations"),
    }
}

#[async_trait]
impl HierarchyProvider for BoxClient {
    async fn folder(&self, id: &ItemId) -> SyncResult<ItemSnapshot> {
        let value: serde_json::Value = self
            .get_json(&format!("/folders/{id}"), &[("fields", ITEM_FIELDS.to_string())])
            .await?;
        Ok(ItemSnapshot::from_source(ItemKind::Folder, &value)?)
    }

    async fn list_children(
        &self,
        folder: &ItemId,
        limit: usize,
        offset: usize,
    ) -> SyncResult<ChildPage> {
        let list: EntryList = self
            .get_json(
                &format!("/folders/{folder}/items"),
                &[
                    ("fields", ITEM_FIELDS.to_string()),
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;

        let received = list.entries.len();
        let mut items = Vec::with_capacity(received);
        for entry in &list.entries {
            let kind = match entry.get("type").and_then(|t| t.as_str()) {
                Some("file") => ItemKind::File,
                Some("folder") => ItemKind::Folder,
                other => {
                    debug!(folder = %folder, kind = ?other, "Skipping unmirrored entry");
                    continue;
                }
            };
            items.push(ItemSnapshot::from_source(kind, entry)?);
        }
        debug!(folder = %folder, offset, received, "Listed folder page");
        Ok(ChildPage { items, received })
    }

    async fn list_collaborations(
        &self,
        id: &ItemId,
        kind: ItemKind,
    ) -> SyncResult<Vec<Collaboration>> {
        let list: EntryList = self.get_json(&collaborations_path(id, kind), &[]).await?;

        let mut collaborations = Vec::new();
        for entry in &list.entries {
            match Collaboration::from_source(entry) {
                // Listings include grants inherited from parent folders.
                Ok(c) if c.item_id == *id => collaborations.push(c),
                Ok(_) => {}
                Err(e) => warn!(item_id = %id, error = %e, "Skipping undecodable collaboration"),
            }
        }
        Ok(collaborations)
    }

    async fn download(&self, file: &ItemId) -> SyncResult<Option<Vec<u8>>> {
        let path = format!("/files/{file}/content");
        let response = self.get(&path, &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = check_status(&path, response)
            .await?
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("failed to read {path}: {e}")))?;
        debug!(item_id = %file, size = bytes.len(), "Downloaded file content");
        Ok(Some(bytes.to_vec()))
    }
}
