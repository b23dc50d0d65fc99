//! Integration tests for the ingestion engine
//!
//! These tests drive the scan loop and the run coordinator against a scripted
//! in-memory feed and a temporary data directory:
//! - Incremental dedup and idempotent re-runs
//! - `since` early exit and `until` per-item filtering
//! - Media collision handling and degraded media retrieval
//! - Rate-limit handling at page and channel level
//! - Per-channel failure isolation in the manifest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    ChannelInfo, FeedMessage, FeedPage, FeedSession, FixedClock, MediaDescriptor,
};
use bytes::Bytes;
use chrono::{NaiveDate, TimeZone, Utc};
use core_ingest::{
    AssetIndex, ChannelScanner, ChannelStatus, DataLayout, IngestError, RunCoordinator,
    ScanError, ScanOptions,
};
use core_runtime::config::ScanSettings;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted feed
// ============================================================================

#[derive(Default)]
struct ScriptedFeed {
    /// Newest-first messages per channel
    feeds: Mutex<HashMap<String, Vec<FeedMessage>>>,
    /// Errors returned by successive `resolve_channel` calls per channel
    resolve_errors: Mutex<HashMap<String, VecDeque<BridgeError>>>,
    /// Errors keyed by the global index of a `fetch_page` call
    page_errors: Mutex<HashMap<usize, BridgeError>>,
    /// Errors returned by successive `download_media` calls
    media_errors: Mutex<VecDeque<BridgeError>>,
    page_calls: Mutex<Vec<(String, Option<i64>)>>,
}

impl ScriptedFeed {
    fn with_feed(self, channel: &str, messages: Vec<FeedMessage>) -> Self {
        self.feeds
            .lock()
            .unwrap()
            .insert(channel.to_string(), messages);
        self
    }

    fn fail_resolve(self, channel: &str, error: BridgeError) -> Self {
        self.resolve_errors
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push_back(error);
        self
    }

    fn fail_page_call(self, call: usize, error: BridgeError) -> Self {
        self.page_errors.lock().unwrap().insert(call, error);
        self
    }

    fn fail_media(self, error: BridgeError) -> Self {
        self.media_errors.lock().unwrap().push_back(error);
        self
    }

    fn page_offsets(&self) -> Vec<Option<i64>> {
        self.page_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, offset)| *offset)
            .collect()
    }
}

#[async_trait]
impl FeedSession for ScriptedFeed {
    async fn resolve_channel(&self, channel: &str) -> BridgeResult<ChannelInfo> {
        if let Some(error) = self
            .resolve_errors
            .lock()
            .unwrap()
            .get_mut(channel)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if !self.feeds.lock().unwrap().contains_key(channel) {
            return Err(BridgeError::NotFound(channel.to_string()));
        }
        Ok(ChannelInfo {
            id: 1,
            username: channel.to_string(),
            title: None,
        })
    }

    async fn fetch_page(
        &self,
        channel: &str,
        offset: Option<i64>,
        page_size: u32,
    ) -> BridgeResult<FeedPage> {
        let call = {
            let mut calls = self.page_calls.lock().unwrap();
            calls.push((channel.to_string(), offset));
            calls.len() - 1
        };
        if let Some(error) = self.page_errors.lock().unwrap().remove(&call) {
            return Err(error);
        }

        let feeds = self.feeds.lock().unwrap();
        let messages = feeds.get(channel).cloned().unwrap_or_default();
        let start = offset.unwrap_or(0) as usize;
        let end = (start + page_size as usize).min(messages.len());

        Ok(FeedPage {
            messages: messages[start.min(end)..end].to_vec(),
            next_offset: (end < messages.len()).then_some(end as i64),
        })
    }

    async fn download_media(&self, _channel: &str, message_id: i64) -> BridgeResult<Bytes> {
        if let Some(error) = self.media_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Bytes::from(format!("image-{}", message_id)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn day(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, d).unwrap()
}

fn msg(id: i64, month: u32, d: u32) -> FeedMessage {
    FeedMessage::new(id, Some(Utc.with_ymd_and_hms(2025, month, d, 12, 0, 0).unwrap()))
        .with_text(format!("post {}", id))
}

fn fast_settings() -> ScanSettings {
    ScanSettings::default()
        .with_page_size(2)
        .with_courtesy(50, Duration::ZERO)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4))
        .with_rate_limit_margin(Duration::ZERO)
}

fn scanner(feed: Arc<ScriptedFeed>, root: &Path) -> ChannelScanner {
    ChannelScanner::new(feed, DataLayout::new(root), &fast_settings())
}

fn stored_ids(root: &Path, channel: &str, date: NaiveDate) -> Vec<i64> {
    let path = DataLayout::new(root).item_log_path(channel, date);
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["id"].as_i64().unwrap())
        .collect()
}

fn seed_log(root: &Path, channel: &str, date: NaiveDate, ids: &[i64]) {
    let path = DataLayout::new(root).item_log_path(channel, date);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = ids
        .iter()
        .map(|id| format!("{{\"id\":{},\"date\":\"{}T12:00:00Z\"}}\n", id, date))
        .collect();
    std::fs::write(path, body).unwrap();
}

// ============================================================================
// Scan loop
// ============================================================================

#[tokio::test]
async fn test_incremental_scan_persists_only_unseen_items_in_feed_order() {
    let dir = tempfile::tempdir().unwrap();
    seed_log(dir.path(), "news_x", day(6, 1), &[1, 2, 3]);

    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "news_x",
        vec![msg(5, 6, 1), msg(4, 6, 1), msg(3, 6, 1), msg(2, 6, 1), msg(1, 6, 1)],
    ));

    let report = scanner(feed, dir.path())
        .scan("news_x", &ScanOptions::default().incremental(true))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped_saved, 3);
    assert_eq!(stored_ids(dir.path(), "news_x", day(6, 1)), vec![1, 2, 3, 5, 4]);
}

#[tokio::test]
async fn test_incremental_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default().with_feed("ch", vec![msg(3, 6, 2), msg(2, 6, 1), msg(1, 6, 1)]),
    );
    let scanner = scanner(feed, dir.path());
    let options = ScanOptions::default().incremental(true);

    let first = scanner.scan("ch", &options).await.unwrap();
    let second = scanner.scan("ch", &options).await.unwrap();

    assert_eq!(first.processed, 3);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_saved, 3);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![2, 1]);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 2)), vec![3]);
}

#[tokio::test]
async fn test_since_stops_channel_at_first_older_item() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "ch",
        vec![msg(4, 6, 10), msg(3, 6, 5), msg(2, 5, 20), msg(1, 6, 1)],
    ));

    let report = scanner(feed.clone(), dir.path())
        .scan("ch", &ScanOptions::default().since(day(6, 1)))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert!(report.halted_at_since);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 10)), vec![4]);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 5)), vec![3]);
    assert!(stored_ids(dir.path(), "ch", day(6, 1)).is_empty());
    assert!(stored_ids(dir.path(), "ch", day(5, 20)).is_empty());
    assert_eq!(feed.page_offsets(), vec![None, Some(2)]);
}

#[tokio::test]
async fn test_until_filters_items_without_stopping() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "ch",
        vec![msg(4, 6, 12), msg(3, 6, 5), msg(2, 6, 11), msg(1, 6, 3)],
    ));

    let report = scanner(feed, dir.path())
        .scan("ch", &ScanOptions::default().until(day(6, 10)))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped_after_until, 2);
    assert!(!report.halted_at_since);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 5)), vec![3]);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 3)), vec![1]);
}

#[tokio::test]
async fn test_limit_counts_only_newly_persisted_items() {
    let dir = tempfile::tempdir().unwrap();
    seed_log(dir.path(), "ch", day(6, 1), &[5, 4]);
    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "ch",
        (1..=6).rev().map(|id| msg(id, 6, 1)).collect(),
    ));

    let report = scanner(feed, dir.path())
        .scan("ch", &ScanOptions::default().incremental(true).limit(2))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![5, 4, 6, 3]);
}

#[tokio::test]
async fn test_repeated_id_within_one_pass_is_persisted_once() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default().with_feed("ch", vec![msg(3, 6, 1), msg(3, 6, 1), msg(2, 6, 1)]),
    );

    let report = scanner(feed, dir.path())
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![3, 2]);
}

#[tokio::test]
async fn test_undated_item_uses_clock_date() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed("ch", vec![FeedMessage::new(9, None)]));
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 7, 4, 9, 0, 0).unwrap()));

    scanner(feed, dir.path())
        .with_clock(clock)
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(stored_ids(dir.path(), "ch", day(7, 4)), vec![9]);
}

#[tokio::test(start_paused = true)]
async fn test_courtesy_pause_counts_only_persisted_items() {
    let dir = tempfile::tempdir().unwrap();
    let saved: Vec<i64> = (1..=150).filter(|id| id % 5 == 0).collect();
    seed_log(dir.path(), "ch", day(6, 1), &saved);

    let feed = Arc::new(
        ScriptedFeed::default().with_feed("ch", (1..=150).rev().map(|id| msg(id, 6, 1)).collect()),
    );
    let pause = Duration::from_secs(300);
    let settings = fast_settings().with_page_size(100).with_courtesy(50, pause);
    let scanner = ChannelScanner::new(feed, DataLayout::new(dir.path()), &settings);

    let started = tokio::time::Instant::now();
    let report = scanner
        .scan("ch", &ScanOptions::default().incremental(true))
        .await
        .unwrap();

    assert_eq!(report.processed, 120);
    assert_eq!(report.skipped_saved, 30);
    // 150 items seen but only 120 persisted: two pauses, not three
    assert_eq!(started.elapsed(), pause * 2);
}

// ============================================================================
// Media retrieval
// ============================================================================

#[tokio::test]
async fn test_media_collision_gets_numeric_suffix_and_sidecar_entry() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let images = layout.channel_images_dir("ch1");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("ch1_42_2025-06-01.jpg"), b"existing").unwrap();

    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "ch1",
        vec![msg(42, 6, 1).with_media(MediaDescriptor::Photo)],
    ));

    let report = scanner(feed, dir.path())
        .scan("ch1", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.media_saved, 1);
    assert_eq!(
        std::fs::read(images.join("ch1_42_2025-06-01.jpg")).unwrap(),
        b"existing"
    );
    assert_eq!(
        std::fs::read(images.join("ch1_42_2025-06-01_1.jpg")).unwrap(),
        b"image-42"
    );

    let sidecar = AssetIndex::load(&layout.asset_sidecar("ch1")).await.unwrap();
    let record = sidecar.lookup("ch1_42_2025-06-01_1.jpg").unwrap();
    assert_eq!(record.message_id, 42);
    assert_eq!(record.date, day(6, 1));
}

#[tokio::test]
async fn test_media_exhaustion_keeps_item() {
    let dir = tempfile::tempdir().unwrap();
    let mut feed = ScriptedFeed::default().with_feed(
        "ch",
        vec![
            msg(2, 6, 1).with_media(MediaDescriptor::Document {
                mime_type: Some("image/png".into()),
                file_name: Some("prices.png".into()),
            }),
            msg(1, 6, 1).with_media(MediaDescriptor::Photo),
        ],
    );
    for _ in 0..4 {
        feed = feed.fail_media(BridgeError::OperationFailed("connection reset".into()));
    }

    let report = scanner(Arc::new(feed), dir.path())
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.media_failed, 1);
    assert_eq!(report.media_saved, 1);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![2, 1]);

    let images = DataLayout::new(dir.path()).channel_images_dir("ch");
    assert!(!images.join("ch_2_2025-06-01.png").exists());
    assert!(images.join("ch_1_2025-06-01.jpg").exists());
}

#[tokio::test]
async fn test_non_image_documents_are_not_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed(
        "ch",
        vec![msg(1, 6, 1).with_media(MediaDescriptor::Document {
            mime_type: Some("application/pdf".into()),
            file_name: Some("catalog.pdf".into()),
        })],
    ));

    let report = scanner(feed, dir.path())
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.media_saved + report.media_failed, 0);
}

// ============================================================================
// Rate limits and pagination failures
// ============================================================================

#[tokio::test]
async fn test_page_rate_limit_resumes_from_current_offset() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default()
            .with_feed("ch", (1..=5).rev().map(|id| msg(id, 6, 1)).collect())
            .fail_page_call(1, BridgeError::RateLimited { retry_after_secs: 0 }),
    );

    let report = scanner(feed.clone(), dir.path())
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.processed, 5);
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![5, 4, 3, 2, 1]);
    assert_eq!(feed.page_offsets(), vec![None, Some(2), Some(2), Some(4)]);
}

#[tokio::test]
async fn test_pagination_exhaustion_keeps_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut feed =
        ScriptedFeed::default().with_feed("ch", (1..=5).rev().map(|id| msg(id, 6, 1)).collect());
    for call in 1..=4 {
        feed = feed.fail_page_call(call, BridgeError::OperationFailed("timeout".into()));
    }

    let error = scanner(Arc::new(feed), dir.path())
        .scan("ch", &ScanOptions::default())
        .await
        .unwrap_err();

    match error {
        ScanError::Feed { processed, source } => {
            assert_eq!(processed, 2);
            assert_eq!(source.attempts, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stored_ids(dir.path(), "ch", day(6, 1)), vec![5, 4]);
}

// ============================================================================
// Run coordinator
// ============================================================================

#[tokio::test]
async fn test_failed_channel_does_not_stop_run() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default()
            .with_feed("ch2", vec![msg(2, 6, 1), msg(1, 6, 1)])
            .fail_resolve("broken", BridgeError::Rejected {
                status: 400,
                message: "CHANNEL_PRIVATE".into(),
            }),
    );

    let outcome = RunCoordinator::new(scanner(feed, dir.path()))
        .run(
            &["broken".to_string(), "ch2".to_string()],
            &ScanOptions::default(),
        )
        .await
        .unwrap();

    let manifest = &outcome.manifest;
    assert_eq!(manifest.channels, vec!["broken", "ch2"]);
    assert!(matches!(
        &manifest.results["broken"].status,
        ChannelStatus::Error(cause) if cause.contains("CHANNEL_PRIVATE")
    ));
    assert_eq!(manifest.results["broken"].processed, 0);
    assert_eq!(manifest.results["ch2"].status, ChannelStatus::Ok);
    assert_eq!(manifest.results["ch2"].processed, 2);
    assert!(manifest.finished_at.unwrap() >= manifest.started_at);

    assert_eq!(stored_ids(dir.path(), "ch2", day(6, 1)), vec![2, 1]);
    assert!(outcome.manifest_path.exists());
    assert_eq!(
        outcome.manifest_path.parent().unwrap(),
        DataLayout::new(dir.path()).manifests_dir()
    );
}

#[tokio::test]
async fn test_channel_rate_limit_retries_whole_channel_once() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default()
            .with_feed("ch", vec![msg(1, 6, 1)])
            .fail_resolve("ch", BridgeError::RateLimited { retry_after_secs: 0 }),
    );

    let outcome = RunCoordinator::new(scanner(feed, dir.path()))
        .run(&["ch".to_string()], &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.manifest.results["ch"].status, ChannelStatus::OkAfterWait);
    assert_eq!(outcome.manifest.results["ch"].processed, 1);
}

#[tokio::test]
async fn test_second_channel_rate_limit_is_recorded_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(
        ScriptedFeed::default()
            .with_feed("ch", vec![msg(1, 6, 1)])
            .fail_resolve("ch", BridgeError::RateLimited { retry_after_secs: 0 })
            .fail_resolve("ch", BridgeError::RateLimited { retry_after_secs: 0 }),
    );

    let outcome = RunCoordinator::new(scanner(feed, dir.path()))
        .run(&["ch".to_string()], &ScanOptions::default())
        .await
        .unwrap();

    assert!(!outcome.manifest.results["ch"].status.is_ok());
}

#[tokio::test]
async fn test_pagination_failure_recorded_with_partial_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut feed = ScriptedFeed::default()
        .with_feed("ch", (1..=5).rev().map(|id| msg(id, 6, 1)).collect());
    for call in 1..=4 {
        feed = feed.fail_page_call(call, BridgeError::OperationFailed("timeout".into()));
    }

    let outcome = RunCoordinator::new(scanner(Arc::new(feed), dir.path()))
        .run(&["ch".to_string()], &ScanOptions::default())
        .await
        .unwrap();

    let result = &outcome.manifest.results["ch"];
    assert_eq!(result.processed, 2);
    assert!(result.status.to_string().starts_with("error:"));
}

#[tokio::test]
async fn test_channel_list_is_deduplicated_and_required() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed("a", vec![msg(1, 6, 1)]));
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 2, 3, 4, 5).unwrap()));
    let coordinator = RunCoordinator::new(scanner(feed, dir.path())).with_clock(clock);

    let outcome = coordinator
        .run(
            &["a".to_string(), "a".to_string()],
            &ScanOptions::default().incremental(true),
        )
        .await
        .unwrap();
    assert_eq!(outcome.manifest.channels, vec!["a"]);
    assert_eq!(outcome.manifest.run_id, "20250602T030405Z");

    let second = coordinator
        .run(&["a".to_string()], &ScanOptions::default().incremental(true))
        .await
        .unwrap();
    assert_eq!(second.manifest.run_id, "20250602T030405Z-1");
    assert_eq!(second.manifest.results["a"].processed, 0);

    let empty = coordinator.run(&[], &ScanOptions::default()).await;
    assert!(matches!(empty, Err(IngestError::NoChannels)));
}

#[tokio::test]
async fn test_cancelled_run_still_writes_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let feed = Arc::new(ScriptedFeed::default().with_feed("a", vec![msg(1, 6, 1)]));
    let coordinator = RunCoordinator::new(scanner(feed, dir.path()));
    coordinator.cancellation_token().cancel();

    let outcome = coordinator
        .run(&["a".to_string(), "b".to_string()], &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(
        outcome.manifest.results["a"].status,
        ChannelStatus::Error("cancelled".into())
    );
    assert_eq!(outcome.manifest.results.len(), 2);
    assert!(outcome.manifest_path.exists());
}
