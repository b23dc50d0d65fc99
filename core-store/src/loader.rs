//! # Raw Message Loader
//!
//! Copies the item log into the `telegram_messages` table.
//!
//! The log is walked partition by partition (`<root>/<YYYY-MM-DD>/<channel>.json`,
//! in name order); the manifests directory is ignored. The channel of each row
//! is the log file's stem. Lines that fail to parse are skipped and counted by
//! reason. Rows already in the table are left as they are, so loading the same
//! tree twice inserts nothing the second time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_ingest::item_log::{parse_item_line, split_lines};
use core_ingest::layout::{ITEM_LOG_EXTENSION, MANIFESTS_DIR};
use core_ingest::SkipReason;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::models::RawMessage;
use crate::repositories::RawMessageRepository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub files: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: BTreeMap<String, usize>,
}

impl LoadSummary {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason.as_str().to_string()).or_default() += 1;
    }
}

pub struct RawMessageLoader {
    repository: Arc<dyn RawMessageRepository>,
}

impl RawMessageLoader {
    pub fn new(repository: Arc<dyn RawMessageRepository>) -> Self {
        Self { repository }
    }

    /// Load every item log below `root`. A missing root loads nothing.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn load_dir(&self, root: &Path) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        for partition in sorted_entries(root).await? {
            if !partition.is_dir() || partition.file_name().is_some_and(|n| n == MANIFESTS_DIR) {
                continue;
            }

            for file in sorted_entries(&partition).await? {
                if file.is_file() && file.extension().is_some_and(|e| e == ITEM_LOG_EXTENSION) {
                    self.load_file(&file, &mut summary).await?;
                }
            }
        }

        info!(
            files = summary.files,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped_total(),
            "Raw messages loaded"
        );
        Ok(summary)
    }

    async fn load_file(&self, path: &Path, summary: &mut LoadSummary) -> Result<()> {
        let Some(channel) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return Ok(());
        };

        let contents = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        summary.files += 1;

        for line in split_lines(&contents) {
            let item = match parse_item_line(line) {
                Ok(item) => item,
                Err(reason) => {
                    warn!(file = %path.display(), %reason, "Skipping log line");
                    summary.skip(reason);
                    continue;
                }
            };

            let message = RawMessage {
                channel: channel.clone(),
                message_id: item.id,
                message_date: item.date().map(str::to_string),
                raw: item.record.to_string(),
            };

            if self.repository.insert_if_absent(&message).await? {
                summary.inserted += 1;
            } else {
                summary.duplicates += 1;
            }
        }

        debug!(file = %path.display(), channel = %channel, "Loaded log file");
        Ok(())
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error = |source: std::io::Error| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
