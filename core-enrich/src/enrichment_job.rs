//! # Enrichment Dedup Loader
//!
//! Runs object detection over downloaded assets and stores one detection
//! record per image, idempotently.
//!
//! ## Overview
//!
//! For every asset, in order:
//! 1. Validate the file (exists, large enough, decodable). Invalid assets are
//!    skipped.
//! 2. Resolve the owning item through the channel's asset sidecar. Assets with
//!    no sidecar entry are skipped. Directories written before sidecars
//!    existed have no sidecar file at all; their item ids are read from the
//!    asset file names instead.
//! 3. Run the detector under the retry executor. Rate limits are waited out;
//!    exhausted or permanent failures and empty results are skipped and
//!    nothing is stored for them.
//! 4. Insert the record. An existing `(channel, message_id, image_path)` key is
//!    counted as a duplicate, not an error.
//!
//! Every record produced in the batch is also exported as one JSON document.
//!
//! ## Usage
//!
//! ```ignore
//! let job = EnrichmentJob::new(layout, detector, Arc::new(SqliteDetectionRepository::new(pool)))
//!     .with_min_image_bytes(config.detector.min_image_bytes);
//!
//! let summary = job.run().await?;
//! println!("{} new detection records", summary.inserted);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::ObjectDetector;
use core_ingest::layout::ASSET_SIDECAR;
use core_ingest::{AssetIndex, DataLayout, RetryExecutor, RetryPolicy};
use core_runtime::logging::strip_path;
use core_store::{DetectionRecord, DetectionRepository};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{EnrichError, Result};
use crate::validation::validate_image;

pub const DEFAULT_MIN_IMAGE_BYTES: u64 = 500;

/// Why an asset produced no detection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    InvalidImage,
    /// No sidecar entry maps the asset to an item
    Unmapped,
    DetectionFailed,
    NoDetections,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidImage => "invalid_image",
            Self::Unmapped => "unmapped",
            Self::DetectionFailed => "detection_failed",
            Self::NoDetections => "no_detections",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentSummary {
    pub scanned: usize,
    /// Newly stored detection records
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub unmapped: usize,
    pub no_detections: usize,
    pub failed: usize,
    /// Where the batch export was written
    pub export_path: Option<PathBuf>,
}

impl EnrichmentSummary {
    fn skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::InvalidImage => self.invalid += 1,
            SkipReason::Unmapped => self.unmapped += 1,
            SkipReason::DetectionFailed => self.failed += 1,
            SkipReason::NoDetections => self.no_detections += 1,
        }
    }
}

pub struct EnrichmentJob {
    layout: DataLayout,
    detector: Arc<dyn ObjectDetector>,
    repository: Arc<dyn DetectionRepository>,
    min_image_bytes: u64,
    executor: RetryExecutor,
}

impl EnrichmentJob {
    pub fn new(
        layout: DataLayout,
        detector: Arc<dyn ObjectDetector>,
        repository: Arc<dyn DetectionRepository>,
    ) -> Self {
        Self {
            layout,
            detector,
            repository,
            min_image_bytes: DEFAULT_MIN_IMAGE_BYTES,
            executor: RetryExecutor::default(),
        }
    }

    pub fn with_min_image_bytes(mut self, bytes: u64) -> Self {
        self.min_image_bytes = bytes;
        self
    }

    /// Retry policy for detector calls. Rate limits are waited out; transient
    /// failures are retried up to `max_attempts`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor = RetryExecutor::new(policy);
        self
    }

    /// Discover every asset under the images root and process them.
    #[instrument(skip(self), name = "enrichment_job")]
    pub async fn run(&self) -> Result<EnrichmentSummary> {
        let assets = self.discover_assets().await?;
        info!(assets = assets.len(), "Discovered assets");
        self.process(&assets).await
    }

    /// Asset files below `<images>/<channel>/`, sorted, sidecars excluded.
    pub async fn discover_assets(&self) -> Result<Vec<PathBuf>> {
        let mut assets = Vec::new();

        for channel_dir in sorted_entries(&self.layout.images_root()).await? {
            if !channel_dir.is_dir() {
                continue;
            }
            for path in sorted_entries(&channel_dir).await? {
                let hidden_or_sidecar = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(true, |n| n == ASSET_SIDECAR || n.starts_with('.'));
                if path.is_file() && !hidden_or_sidecar {
                    assets.push(path);
                }
            }
        }

        Ok(assets)
    }

    /// Process the given assets in order.
    pub async fn process(&self, assets: &[PathBuf]) -> Result<EnrichmentSummary> {
        let mut summary = EnrichmentSummary::default();
        let mut sidecars: HashMap<PathBuf, Option<AssetIndex>> = HashMap::new();
        let mut produced = Vec::new();

        for asset in assets {
            summary.scanned += 1;

            match self.enrich_one(asset, &mut sidecars).await? {
                Ok(record) => {
                    if self.repository.insert_if_absent(&record).await? {
                        summary.inserted += 1;
                    } else {
                        debug!(image = %record.image_path, "Detection record already stored");
                        summary.duplicates += 1;
                    }
                    produced.push(record);
                }
                Err(reason) => summary.skip(reason),
            }
        }

        summary.export_path = Some(self.export(&produced).await?);

        info!(
            scanned = summary.scanned,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            invalid = summary.invalid,
            unmapped = summary.unmapped,
            no_detections = summary.no_detections,
            failed = summary.failed,
            "Enrichment finished"
        );

        Ok(summary)
    }

    /// Outer error aborts the job; inner error skips the asset.
    async fn enrich_one(
        &self,
        asset: &Path,
        sidecars: &mut HashMap<PathBuf, Option<AssetIndex>>,
    ) -> Result<std::result::Result<DetectionRecord, SkipReason>> {
        let shown = asset.to_string_lossy();
        let image = strip_path(&shown);

        if let Err(invalid) = validate_image(asset, self.min_image_bytes).await {
            warn!(image, reason = %invalid, "Skipping invalid image");
            return Ok(Err(SkipReason::InvalidImage));
        }

        let (Some(dir), Some(file_name)) = (asset.parent(), asset.file_name()) else {
            return Ok(Err(SkipReason::Unmapped));
        };
        let file_name = file_name.to_string_lossy();
        let channel = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !sidecars.contains_key(dir) {
            let sidecar_path = dir.join(ASSET_SIDECAR);
            let io_error = |source: std::io::Error| EnrichError::Io {
                path: sidecar_path.clone(),
                source,
            };
            let index = if tokio::fs::try_exists(&sidecar_path).await.map_err(io_error)? {
                Some(AssetIndex::load(&sidecar_path).await.map_err(io_error)?)
            } else {
                debug!(dir = %dir.display(), "No asset sidecar, falling back to file names");
                None
            };
            sidecars.insert(dir.to_path_buf(), index);
        }

        let message_id = match sidecars.get(dir) {
            Some(Some(index)) => index.lookup(&file_name).map(|record| record.message_id),
            _ => {
                let id = legacy_message_id(&channel, &file_name);
                if let Some(id) = id {
                    info!(image, message_id = id, "Item id taken from file name");
                }
                id
            }
        };
        let Some(message_id) = message_id else {
            warn!(image, reason = %SkipReason::Unmapped, "No item recorded for asset");
            return Ok(Err(SkipReason::Unmapped));
        };

        let label = format!("detect {}", image);
        let detections = match self.executor.run(&label, || self.detector.detect(asset)).await {
            Ok(detections) => detections,
            Err(exhausted) => {
                warn!(
                    image,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Detection failed"
                );
                return Ok(Err(SkipReason::DetectionFailed));
            }
        };

        if detections.is_empty() {
            debug!(image, "No objects detected");
            return Ok(Err(SkipReason::NoDetections));
        }

        let image_path = format!("{}/{}", channel, file_name);
        Ok(Ok(DetectionRecord::new(channel, message_id, image_path, detections)))
    }

    async fn export(&self, records: &[DetectionRecord]) -> Result<PathBuf> {
        let path = self.layout.detections_export();
        let io_error = |source: std::io::Error| EnrichError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?)
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error)?;

        info!(path = %path.display(), records = records.len(), "Exported detections");
        Ok(path)
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error = |source: std::io::Error| EnrichError::Io {
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

/// Item id encoded in an asset name written before sidecars existed
/// (`<channel>_<id>_<date>[_n].<ext>`). Names without the channel prefix fall
/// back to the first run of digits.
fn legacy_message_id(channel: &str, file_name: &str) -> Option<i64> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;

    let rest = stem
        .strip_prefix(channel)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(stem);

    let start = rest.find(|c: char| c.is_ascii_digit())?;
    let digits = &rest[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}
