//! On-disk layout of raw harvest data.
//!
//! ```text
//! <raw>/telegram_messages/<YYYY-MM-DD>/<channel>.json     item log (NDJSON)
//! <raw>/telegram_messages/_manifests/<run_id>.json       run manifests
//! <raw>/images/<channel>/<channel>_<id>_<YYYY-MM-DD><ext> assets
//! <raw>/images/<channel>/_assets.jsonl                   asset -> item sidecar
//! <raw>/yolo_outputs/all_detections.json                 detection export
//! ```
//!
//! `<channel>` is always the sanitized channel name.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const MESSAGES_DIR: &str = "telegram_messages";
pub const IMAGES_DIR: &str = "images";
pub const MANIFESTS_DIR: &str = "_manifests";
pub const DETECTIONS_DIR: &str = "yolo_outputs";
pub const ASSET_SIDECAR: &str = "_assets.jsonl";
pub const ITEM_LOG_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    raw_root: PathBuf,
}

impl DataLayout {
    pub fn new(raw_root: impl Into<PathBuf>) -> Self {
        Self {
            raw_root: raw_root.into(),
        }
    }

    pub fn raw_root(&self) -> &Path {
        &self.raw_root
    }

    pub fn messages_root(&self) -> PathBuf {
        self.raw_root.join(MESSAGES_DIR)
    }

    pub fn images_root(&self) -> PathBuf {
        self.raw_root.join(IMAGES_DIR)
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.messages_root().join(MANIFESTS_DIR)
    }

    pub fn detections_export(&self) -> PathBuf {
        self.raw_root.join(DETECTIONS_DIR).join("all_detections.json")
    }

    /// Item log file for one (channel, date) partition
    pub fn item_log_path(&self, channel: &str, date: NaiveDate) -> PathBuf {
        self.messages_root()
            .join(date.format("%Y-%m-%d").to_string())
            .join(item_log_file_name(channel))
    }

    pub fn channel_images_dir(&self, channel: &str) -> PathBuf {
        self.images_root().join(sanitize_filename(channel))
    }

    pub fn asset_sidecar(&self, channel: &str) -> PathBuf {
        self.channel_images_dir(channel).join(ASSET_SIDECAR)
    }
}

pub fn item_log_file_name(channel: &str) -> String {
    format!("{}.{}", sanitize_filename(channel), ITEM_LOG_EXTENSION)
}

/// Replace every run of characters outside `[\w\-. ]` with a single `_`.
///
/// Names that would resolve to the current or parent directory become `_`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.trim().chars() {
        if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    if out.is_empty() || out.chars().all(|c| c == '.') {
        return "_".to_string();
    }

    out
}
