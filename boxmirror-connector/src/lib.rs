//! Settings and event loading for the Box mirror connector binary.

use anyhow::{bail, Context, Result};
use boxmirror_sync::{BoxClientConfig, MemoryQueue, SyncConfig};
use boxmirror_types::ItemId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the binary needs, as read from the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sync: SyncConfig,
    #[serde(rename = "box")]
    pub box_api: BoxClientConfig,
    /// Mirror database file.
    pub database_path: Option<PathBuf>,
    /// Root of the filesystem blob store.
    pub blob_dir: Option<PathBuf>,
}

impl Settings {
    /// Reads settings from a JSON file, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Applies environment overrides: `BOX_ACCESS_TOKEN`, `BUCKET_NAME`,
    /// `BOX_ROOT_FOLDER_IDS` (comma-separated) and `SKIP_EXISTING_ITEMS`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup("BOX_ACCESS_TOKEN") {
            self.box_api.access_token = token;
        }
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.sync.layout.bucket = bucket;
        }
        if let Some(ids) = lookup("BOX_ROOT_FOLDER_IDS") {
            self.sync.root_folder_ids = parse_folder_ids(&ids)?;
        }
        if let Some(skip) = lookup("SKIP_EXISTING_ITEMS") {
            self.sync.skip_existing_items = parse_flag(&skip)
                .with_context(|| format!("Invalid SKIP_EXISTING_ITEMS: {skip}"))?;
        }
        Ok(())
    }
}

/// Parses `"0, 123,456"` into folder ids.
pub fn parse_folder_ids(raw: &str) -> Result<Vec<ItemId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                bail!("Invalid folder id: {s}");
            }
            Ok(ItemId::from(s))
        })
        .collect()
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" | "t" => Ok(true),
        "0" | "false" | "no" | "off" | "n" | "f" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// Loads a JSON-lines file of notifications into a fresh queue. Blank
/// lines are skipped; every other line becomes one message, valid or not.
pub async fn load_events(path: &Path) -> Result<MemoryQueue> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read events {}", path.display()))?;
    let queue = MemoryQueue::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        queue.push(line).await;
    }
    Ok(queue)
}
