//! # Run Coordinator
//!
//! Scans every requested channel in order and records the outcome of each in a
//! [`RunManifest`].
//!
//! ## Overview
//!
//! - The channel list is deduplicated keeping first occurrences.
//! - Channels are scanned strictly one after another; the provider's flood
//!   control is shared across channels.
//! - A channel-level rate limit is waited out and the whole channel is scanned
//!   once more (`ok_after_wait` on success).
//! - Any other failure is recorded as `error:<cause>` and the run moves on.
//! - The manifest is written once at the very end, even if every channel failed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = RunCoordinator::new(scanner);
//! let outcome = coordinator.run(&channels, &options).await?;
//! println!("manifest: {}", outcome.manifest_path.display());
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bridge_traits::{Clock, SystemClock};
use core_runtime::channels::dedup_channels;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{IngestError, Result, ScanError};
use crate::manifest::{allocate_run_id, ChannelStatus, RunManifest};
use crate::scan::{ChannelScanner, ScanOptions, ScanReport};

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
    /// Reports of channels that completed successfully
    pub reports: Vec<ScanReport>,
}

pub struct RunCoordinator {
    scanner: ChannelScanner,
    clock: Arc<dyn Clock>,
}

impl RunCoordinator {
    pub fn new(scanner: ChannelScanner) -> Self {
        Self {
            scanner,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for run ids and manifest timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.scanner.cancellation_token()
    }

    #[instrument(skip_all, fields(requested = channels.len()))]
    pub async fn run(&self, channels: &[String], options: &ScanOptions) -> Result<RunOutcome> {
        options.validate()?;

        let channels = dedup_channels(channels);
        if channels.is_empty() {
            return Err(IngestError::NoChannels);
        }

        let manifests_dir = self.scanner.layout().manifests_dir();
        let started_at = self.clock.now();
        let run_id = allocate_run_id(&manifests_dir, started_at);
        let mut manifest = RunManifest::new(run_id.clone(), channels.clone(), options, started_at);
        let mut reports = Vec::new();

        info!(run_id = %run_id, channels = channels.len(), "Starting run");

        for channel in &channels {
            if self.cancellation_token().is_cancelled() {
                warn!(channel = %channel, "Run cancelled, channel not scanned");
                manifest.record(channel, 0, ChannelStatus::Error("cancelled".to_string()));
                continue;
            }

            let (processed, status) = match self.scan_with_wait(channel, options).await {
                Ok((report, status)) => {
                    let processed = report.processed;
                    reports.push(report);
                    (processed, status)
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Channel failed");
                    (e.processed(), ChannelStatus::Error(e.to_string()))
                }
            };

            info!(channel = %channel, processed, status = %status, "Channel finished");
            manifest.record(channel, processed, status);
        }

        manifest.finish(self.clock.now());

        let manifest_path =
            manifest
                .write(&manifests_dir)
                .await
                .map_err(|source| IngestError::Manifest {
                    path: manifests_dir.clone(),
                    source,
                })?;

        info!(
            run_id = %run_id,
            total_processed = manifest.total_processed(),
            path = %manifest_path.display(),
            "Run manifest saved"
        );

        Ok(RunOutcome {
            manifest,
            manifest_path,
            reports,
        })
    }

    /// Scan a channel, retrying it once after a channel-level rate limit.
    async fn scan_with_wait(
        &self,
        channel: &str,
        options: &ScanOptions,
    ) -> std::result::Result<(ScanReport, ChannelStatus), ScanError> {
        match self.scanner.scan(channel, options).await {
            Ok(report) => Ok((report, ChannelStatus::Ok)),
            Err(ScanError::RateLimited { retry_after_secs }) => {
                let wait = self.scanner.retry_policy().rate_limit_delay(retry_after_secs);
                warn!(
                    channel,
                    wait_secs = wait.as_secs_f64(),
                    "Channel rate limited, waiting before one retry"
                );
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.cancellation_token().cancelled() => {
                        return Err(ScanError::Cancelled { processed: 0 });
                    }
                }

                let report = self.scanner.scan(channel, options).await?;
                Ok((report, ChannelStatus::OkAfterWait))
            }
            Err(e) => Err(e),
        }
    }
}
