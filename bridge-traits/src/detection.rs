//! Object Detection Abstraction
//!
//! The detection model itself lives outside this workspace. Hosts plug in any
//! implementation that maps an image on disk to a list of boxes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f32,
    /// Bounding box as absolute pixel coordinates `[x1, y1, x2, y2]`
    #[serde(rename = "xyxy")]
    pub bbox: [f32; 4],
}

/// Object detector contract
///
/// # Example
///
/// ```ignore
/// let detections = detector.detect(Path::new("data/raw/images/chan/chan_12_2024-05-01.jpg")).await?;
/// for d in detections {
///     println!("{} {:.2}", d.class_name, d.confidence);
/// }
/// ```
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run detection on the image at `image`.
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>>;
}
