//! Asset sidecar: explicit mapping from a downloaded asset to the item it belongs to.
//!
//! Written by media retrieval next to the assets of a channel and read by the
//! enrichment job, so nothing ever has to parse ids back out of file names.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::item_log::{split_lines, SkipReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// File name of the asset inside the channel's image directory
    pub asset: String,
    /// Channel name as requested (not sanitized)
    pub channel: String,
    pub message_id: i64,
    pub date: NaiveDate,
}

pub async fn append_asset_record(path: &Path, record: &AssetRecord) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}

/// In-memory view of one sidecar file, keyed by asset file name.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    records: HashMap<String, AssetRecord>,
    skipped: usize,
}

impl AssetIndex {
    /// Load a sidecar. A missing file yields an empty index.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let mut index = Self::default();
        for line in split_lines(&contents) {
            match serde_json::from_slice::<AssetRecord>(line) {
                Ok(record) => {
                    index.records.insert(record.asset.clone(), record);
                }
                Err(_) => {
                    debug!(path = %path.display(), reason = %SkipReason::InvalidJson, "Skipping sidecar line");
                    index.skipped += 1;
                }
            }
        }

        Ok(index)
    }

    pub fn lookup(&self, asset: &str) -> Option<&AssetRecord> {
        self.records.get(asset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
