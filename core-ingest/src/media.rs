//! # Media Retrieval
//!
//! Downloads the image attached to a persisted item.
//!
//! Eligible attachments are photos and documents whose MIME type starts with
//! `image`. The destination is
//! `<images>/<channel>/<channel>_<id>_<YYYY-MM-DD><ext>`; when that path is
//! taken, `_1`, `_2`, ... is inserted before the extension. Existing files are
//! never overwritten.
//!
//! Retrieval is best-effort: any failure is logged and reported as `None` so the
//! scan loop keeps the item and moves on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{FeedMessage, FeedSession, MediaDescriptor};
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::layout::{sanitize_filename, DataLayout};
use crate::retry::RetryExecutor;
use crate::sidecar::{append_asset_record, AssetRecord};

pub const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Clone)]
pub struct MediaFetcher {
    session: Arc<dyn FeedSession>,
    layout: DataLayout,
    executor: RetryExecutor,
}

impl MediaFetcher {
    pub fn new(session: Arc<dyn FeedSession>, layout: DataLayout, executor: RetryExecutor) -> Self {
        Self {
            session,
            layout,
            executor,
        }
    }

    /// Download the item's image, if it declares one.
    ///
    /// Returns the written path, or `None` when the item has no eligible
    /// attachment or retrieval failed.
    pub async fn fetch(&self, channel: &str, message: &FeedMessage, date: NaiveDate) -> Option<PathBuf> {
        let media = message.image_media()?;
        let stem = asset_stem(channel, message.id, date);
        let extension = asset_extension(media);

        let session = &self.session;
        let id = message.id;
        let label = format!("download {}/{}", channel, id);
        let data = match self
            .executor
            .run(&label, move || session.download_media(channel, id))
            .await
        {
            Ok(data) if data.is_empty() => {
                warn!(channel, message_id = id, "Provider returned an empty attachment");
                return None;
            }
            Ok(data) => data,
            Err(e) => {
                warn!(channel, message_id = id, error = %e, "Failed to download image");
                return None;
            }
        };

        let dir = self.layout.channel_images_dir(channel);
        let path = match write_unique(&dir, &stem, &extension, &data).await {
            Ok(path) => path,
            Err(e) => {
                warn!(channel, message_id = id, error = %e, "Failed to store image");
                return None;
            }
        };

        let record = AssetRecord {
            asset: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            channel: channel.to_string(),
            message_id: id,
            date,
        };
        if let Err(e) = append_asset_record(&self.layout.asset_sidecar(channel), &record).await {
            warn!(channel, message_id = id, error = %e, "Failed to record asset in sidecar");
        }

        info!(channel, message_id = id, path = %path.display(), "Downloaded image");
        Some(path)
    }
}

/// `<channel>_<id>_<YYYY-MM-DD>` with the sanitized channel name
pub fn asset_stem(channel: &str, id: i64, date: NaiveDate) -> String {
    format!("{}_{}_{}", sanitize_filename(channel), id, date.format("%Y-%m-%d"))
}

/// Extension from the sender's file name hint, `.jpg` otherwise.
pub fn asset_extension(media: &MediaDescriptor) -> String {
    media
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Candidate path for the `n`-th collision (0 = no suffix)
pub fn candidate_path(dir: &Path, stem: &str, extension: &str, n: u32) -> PathBuf {
    if n == 0 {
        dir.join(format!("{}{}", stem, extension))
    } else {
        dir.join(format!("{}_{}{}", stem, n, extension))
    }
}

/// Write `data` to the first free candidate path, creating `dir` if needed.
///
/// Uses create-new semantics so a path that appears concurrently is skipped
/// rather than overwritten.
pub async fn write_unique(dir: &Path, stem: &str, extension: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let mut n = 0u32;
    loop {
        let candidate = candidate_path(dir, stem, extension, n);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                n += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Only our own partial file is removed.
            let _ = tokio::fs::remove_file(&candidate).await;
            return Err(e);
        }

        return Ok(candidate);
    }
}
