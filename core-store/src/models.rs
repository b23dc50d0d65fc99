//! Rows stored in the harvest database.

use bridge_traits::Detection;
use serde::{Deserialize, Serialize};

/// One raw feed item as read from the item log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub channel: String,
    pub message_id: i64,
    /// `date` field as stored in the log, if any
    pub message_date: Option<String>,
    /// The full log line, re-serialized
    pub raw: String,
}

/// Detections for one image of one item.
///
/// Unique on `(channel, message_id, image_path)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub channel: String,
    pub message_id: i64,
    pub image_path: String,
    pub detections: Vec<Detection>,
}

impl DetectionRecord {
    pub fn new(
        channel: impl Into<String>,
        message_id: i64,
        image_path: impl Into<String>,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            channel: channel.into(),
            message_id,
            image_path: image_path.into(),
            detections,
        }
    }
}
