//! Integration tests for the detection enrichment job

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{Detection, ObjectDetector};
use chrono::NaiveDate;
use core_enrich::EnrichmentJob;
use core_ingest::sidecar::append_asset_record;
use core_ingest::{AssetRecord, DataLayout, RetryPolicy};
use core_store::{create_test_pool, DetectionRecord, DetectionRepository, SqliteDetectionRepository};
use image::{ImageFormat, Rgb, RgbImage};
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Detector {}

    #[async_trait]
    impl ObjectDetector for Detector {
        async fn detect(&self, image: &Path) -> BridgeResult<Vec<Detection>>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn bottle() -> Detection {
    Detection {
        class_id: 39,
        class_name: "bottle".to_string(),
        confidence: 0.87,
        bbox: [10.0, 20.0, 110.0, 220.0],
    }
}

fn write_valid_image(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 64]))
        .save_with_format(path, ImageFormat::Bmp)
        .unwrap();
}

/// Store a valid image for `(channel, id)` and record it in the sidecar.
async fn mapped_asset(layout: &DataLayout, channel: &str, id: i64) -> PathBuf {
    let name = format!("{}_{}_2025-06-01.jpg", channel, id);
    let path = layout.channel_images_dir(channel).join(&name);
    write_valid_image(&path);

    append_asset_record(
        &layout.asset_sidecar(channel),
        &AssetRecord {
            asset: name,
            channel: channel.to_string(),
            message_id: id,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        },
    )
    .await
    .unwrap();

    path
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        rate_limit_margin: Duration::ZERO,
    }
}

async fn repository() -> Arc<SqliteDetectionRepository> {
    Arc::new(SqliteDetectionRepository::new(create_test_pool().await.unwrap()))
}

// ============================================================================
// Enrichment job
// ============================================================================

#[tokio::test]
async fn test_enrichment_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    mapped_asset(&layout, "ch1", 42).await;
    mapped_asset(&layout, "ch2", 7).await;

    let mut detector = MockDetector::new();
    detector.expect_detect().times(4).returning(|_| Ok(vec![bottle()]));

    let repo = repository().await;
    let job = EnrichmentJob::new(layout.clone(), Arc::new(detector), repo.clone());

    let first = job.run().await.unwrap();
    assert_eq!(first.scanned, 2);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.duplicates, 0);

    let second = job.run().await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(repo.count().await.unwrap(), 2);

    let stored = repo.find_by_message("ch1", 42).await.unwrap();
    assert_eq!(
        stored,
        vec![DetectionRecord::new("ch1", 42, "ch1/ch1_42_2025-06-01.jpg", vec![bottle()])]
    );

    let export_path = second.export_path.unwrap();
    assert_eq!(export_path, layout.detections_export());
    let exported: Vec<DetectionRecord> =
        serde_json::from_slice(&std::fs::read(export_path).unwrap()).unwrap();
    assert_eq!(exported.len(), 2);
}

#[tokio::test]
async fn test_collided_asset_maps_through_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    mapped_asset(&layout, "ch1", 42).await;

    let second = layout.channel_images_dir("ch1").join("ch1_42_2025-06-01_1.jpg");
    write_valid_image(&second);
    append_asset_record(
        &layout.asset_sidecar("ch1"),
        &AssetRecord {
            asset: "ch1_42_2025-06-01_1.jpg".to_string(),
            channel: "ch1".to_string(),
            message_id: 42,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        },
    )
    .await
    .unwrap();

    let mut detector = MockDetector::new();
    detector.expect_detect().times(2).returning(|_| Ok(vec![bottle()]));

    let repo = repository().await;
    let summary = EnrichmentJob::new(layout, Arc::new(detector), repo.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    let images: Vec<String> = repo
        .find_by_message("ch1", 42)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.image_path)
        .collect();
    assert_eq!(
        images,
        vec!["ch1/ch1_42_2025-06-01.jpg", "ch1/ch1_42_2025-06-01_1.jpg"]
    );
}

#[tokio::test]
async fn test_invalid_and_unmapped_assets_never_reach_detector() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let images = layout.channel_images_dir("ch1");
    std::fs::create_dir_all(&images).unwrap();

    mapped_asset(&layout, "ch1", 9).await;
    std::fs::write(images.join("ch1_1_2025-06-01.jpg"), vec![0u8; 100]).unwrap();
    std::fs::write(images.join("ch1_2_2025-06-01.jpg"), vec![9u8; 4096]).unwrap();
    write_valid_image(&images.join("ch1_3_2025-06-01.jpg"));
    std::fs::remove_file(images.join("ch1_9_2025-06-01.jpg")).unwrap();

    let mut detector = MockDetector::new();
    detector.expect_detect().never();

    let summary = EnrichmentJob::new(layout, Arc::new(detector), repository().await)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.invalid, 2);
    assert_eq!(summary.unmapped, 1);
    assert_eq!(summary.inserted, 0);
}

#[tokio::test]
async fn test_detector_failures_and_empty_results_are_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let failing = mapped_asset(&layout, "ch1", 1).await;
    let empty = mapped_asset(&layout, "ch1", 2).await;
    mapped_asset(&layout, "ch1", 3).await;

    let mut detector = MockDetector::new();
    detector.expect_detect().times(4).returning(move |path| {
        if path == failing {
            Err(BridgeError::OperationFailed("inference timed out".into()))
        } else if path == empty {
            Ok(Vec::new())
        } else {
            Ok(vec![bottle()])
        }
    });

    let repo = repository().await;
    let summary = EnrichmentJob::new(layout, Arc::new(detector), repo.clone())
        .with_retry_policy(fast_retry(2))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.no_detections, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(repo.count().await.unwrap(), 1);
    assert!(repo.find_by_message("ch1", 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_min_image_bytes_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    mapped_asset(&layout, "ch1", 1).await;

    let mut detector = MockDetector::new();
    detector.expect_detect().never();

    let summary = EnrichmentJob::new(layout, Arc::new(detector), repository().await)
        .with_min_image_bytes(1_000_000)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.invalid, 1);
}

#[tokio::test]
async fn test_empty_images_root_exports_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());

    let summary = EnrichmentJob::new(layout.clone(), Arc::new(MockDetector::new()), repository().await)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.scanned, 0);
    let exported: Vec<DetectionRecord> =
        serde_json::from_slice(&std::fs::read(layout.detections_export()).unwrap()).unwrap();
    assert!(exported.is_empty());
}

#[tokio::test]
async fn test_detector_rate_limit_is_waited_out() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    mapped_asset(&layout, "ch1", 42).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut detector = MockDetector::new();
    detector.expect_detect().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Err(BridgeError::RateLimited { retry_after_secs: 0 })
        } else {
            Ok(vec![bottle()])
        }
    });

    let repo = repository().await;
    let summary = EnrichmentJob::new(layout, Arc::new(detector), repo.clone())
        .with_retry_policy(fast_retry(1))
        .run()
        .await
        .unwrap();

    // Rate limits do not spend the single attempt
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_directory_without_sidecar_maps_ids_from_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let images = layout.channel_images_dir("CheMed123");
    write_valid_image(&images.join("CheMed123_4521_2025-06-01.jpg"));
    write_valid_image(&images.join("CheMed123_4521_2025-06-01_1.jpg"));
    write_valid_image(&images.join("cover.jpg"));

    let mut detector = MockDetector::new();
    detector.expect_detect().times(2).returning(|_| Ok(vec![bottle()]));

    let repo = repository().await;
    let summary = EnrichmentJob::new(layout, Arc::new(detector), repo.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.unmapped, 1);
    assert_eq!(repo.find_by_message("CheMed123", 4521).await.unwrap().len(), 2);
}
