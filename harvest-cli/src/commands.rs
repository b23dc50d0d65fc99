//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::HttpClient;
use core_enrich::{EnrichmentJob, EnrichmentSummary, HttpDetector};
use core_ingest::{
    ChannelScanner, DataLayout, RetryPolicy, RunCoordinator, RunOutcome, ScanOptions,
};
use core_runtime::channels::{dedup_channels, load_channels_file};
use core_runtime::config::HarvestConfig;
use core_store::{
    create_pool, DatabaseConfig, LoadSummary, RawMessageLoader, SqliteDetectionRepository,
    SqliteRawMessageRepository,
};
use provider_telegram::TelegramGatewayConnector;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ScrapeArgs;

fn http_client() -> Result<Arc<dyn HttpClient>> {
    let client = ReqwestHttpClient::new().context("Failed to create HTTP client")?;
    Ok(Arc::new(client))
}

async fn open_database(config: &HarvestConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    create_pool(DatabaseConfig::new(&config.database_path))
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))
}

/// Channels from the file followed by the ones given on the command line.
fn collect_channels(channels_file: &Path, extra: &[String]) -> Result<Vec<String>> {
    let from_file = load_channels_file(channels_file)
        .with_context(|| format!("Failed to read {}", channels_file.display()))?;

    let channels = dedup_channels(from_file.iter().chain(extra.iter()));
    if channels.is_empty() {
        bail!(
            "No channels given: add them to {} or pass --channels",
            channels_file.display()
        );
    }
    Ok(channels)
}

pub async fn scrape(
    config: &HarvestConfig,
    args: &ScrapeArgs,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    let channels = collect_channels(&args.channels_file, &args.channels)?;

    let mut options = ScanOptions::default().incremental(args.incremental);
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if let Some(since) = args.since {
        options = options.since(since);
    }
    if let Some(until) = args.until {
        options = options.until(until);
    }

    let session = TelegramGatewayConnector::from_config(http_client()?, config)
        .context("Scrape needs the gateway URL and Telegram credentials")?;
    let scanner = ChannelScanner::new(
        Arc::new(session),
        DataLayout::new(config.raw_dir()),
        &config.scan,
    )
    .with_cancellation(cancel);

    let outcome = RunCoordinator::new(scanner)
        .run(&channels, &options)
        .await
        .context("Scrape run failed")?;

    for (channel, result) in &outcome.manifest.results {
        println!("{:<32} {:>6}  {}", channel, result.processed, result.status);
    }
    println!(
        "Run {}: {} new items, manifest at {}",
        outcome.manifest.run_id,
        outcome.manifest.total_processed(),
        outcome.manifest_path.display()
    );

    Ok(outcome)
}

pub async fn load(config: &HarvestConfig, source: Option<PathBuf>) -> Result<LoadSummary> {
    let root = source.unwrap_or_else(|| DataLayout::new(config.raw_dir()).messages_root());
    let pool = open_database(config).await?;

    let loader = RawMessageLoader::new(Arc::new(SqliteRawMessageRepository::new(pool)));
    let summary = loader
        .load_dir(&root)
        .await
        .with_context(|| format!("Failed to load {}", root.display()))?;

    println!(
        "Loaded {} files: {} inserted, {} duplicates, {} skipped",
        summary.files,
        summary.inserted,
        summary.duplicates,
        summary.skipped_total()
    );
    for (reason, count) in &summary.skipped {
        println!("  skipped {:<18} {}", reason, count);
    }

    Ok(summary)
}

pub async fn enrich(config: &HarvestConfig) -> Result<EnrichmentSummary> {
    let detector = HttpDetector::from_settings(http_client()?, &config.detector)
        .context("Enrichment needs a detector endpoint")?;
    let pool = open_database(config).await?;

    let job = EnrichmentJob::new(
        DataLayout::new(config.raw_dir()),
        Arc::new(detector),
        Arc::new(SqliteDetectionRepository::new(pool)),
    )
    .with_min_image_bytes(config.detector.min_image_bytes)
    .with_retry_policy(RetryPolicy::from(&config.scan));

    let summary = job.run().await.context("Enrichment failed")?;

    println!(
        "Scanned {} images: {} inserted, {} duplicates, {} invalid, {} unmapped, {} without detections, {} failed",
        summary.scanned,
        summary.inserted,
        summary.duplicates,
        summary.invalid,
        summary.unmapped,
        summary.no_detections,
        summary.failed
    );
    if let Some(path) = &summary.export_path {
        println!("Detections exported to {}", path.display());
    }

    Ok(summary)
}

/// Incremental scrape, then load, then enrich. Stops at the first failing stage.
pub async fn pipeline(
    config: &HarvestConfig,
    channels_file: PathBuf,
    channels: Vec<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let args = ScrapeArgs {
        channels_file,
        channels,
        limit: None,
        incremental: true,
        since: None,
        until: None,
    };

    info!(stage = "scrape", "Pipeline stage starting");
    let outcome = scrape(config, &args, cancel.clone()).await?;
    if cancel.is_cancelled() {
        bail!("Interrupted during scrape (run {})", outcome.manifest.run_id);
    }

    info!(stage = "load", "Pipeline stage starting");
    load(config, None).await?;

    info!(stage = "enrich", "Pipeline stage starting");
    enrich(config).await?;

    info!(run_id = %outcome.manifest.run_id, "Pipeline complete");
    Ok(())
}
