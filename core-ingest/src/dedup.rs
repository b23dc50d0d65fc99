//! Dedup Index
//!
//! Set of item ids already persisted for a channel, rebuilt from the item log at
//! the start of every incremental scan. Never persisted, never mutated after
//! construction.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;

use tracing::{debug, warn};

use crate::item_log::{parse_item_line, split_lines, SkipReason};
use crate::layout::{item_log_file_name, DataLayout, MANIFESTS_DIR};

#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    ids: HashSet<i64>,
    skipped: BTreeMap<SkipReason, usize>,
}

impl DedupIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            skipped: BTreeMap::new(),
        }
    }

    /// Collect every well-formed id stored for `channel` across all date partitions.
    ///
    /// Malformed lines and unreadable partition files are skipped. The only error
    /// is failing to list the messages root itself; a missing root yields an
    /// empty index.
    pub async fn build(layout: &DataLayout, channel: &str) -> std::io::Result<Self> {
        let root = layout.messages_root();
        let file_name = item_log_file_name(channel);
        let mut index = Self::empty();

        let mut partitions = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(e),
        };

        let mut files_read = 0usize;
        while let Some(entry) = partitions.next_entry().await? {
            if entry.file_name() == MANIFESTS_DIR {
                continue;
            }
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let path = entry.path().join(&file_name);
            let contents = match tokio::fs::read(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable item log");
                    continue;
                }
            };

            files_read += 1;
            for line in split_lines(&contents) {
                match parse_item_line(line) {
                    Ok(item) => {
                        index.ids.insert(item.id);
                    }
                    Err(reason) => {
                        debug!(path = %path.display(), reason = %reason, "Skipping stored line");
                        *index.skipped.entry(reason).or_default() += 1;
                    }
                }
            }
        }

        debug!(
            channel,
            files = files_read,
            ids = index.ids.len(),
            skipped = index.skipped_total(),
            "Built dedup index"
        );

        Ok(index)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Count of skipped lines per reason
    pub fn skipped(&self) -> &BTreeMap<SkipReason, usize> {
        &self.skipped
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}
