//! Detection repository trait and implementation

use crate::error::Result;
use crate::models::DetectionRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[async_trait]
pub trait DetectionRepository: Send + Sync {
    /// Insert a detection record unless its `(channel, message_id, image_path)`
    /// key is already stored.
    ///
    /// # Returns
    /// - `Ok(true)` if the row was inserted
    /// - `Ok(false)` if it already existed
    async fn insert_if_absent(&self, record: &DetectionRecord) -> Result<bool>;

    async fn find_by_message(&self, channel: &str, message_id: i64) -> Result<Vec<DetectionRecord>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteDetectionRepository {
    pool: SqlitePool,
}

impl SqliteDetectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DetectionRepository for SqliteDetectionRepository {
    async fn insert_if_absent(&self, record: &DetectionRecord) -> Result<bool> {
        let detections = serde_json::to_string(&record.detections)?;

        let result = sqlx::query(
            r#"
            INSERT INTO image_detections
                (channel, message_id, image_path, detections, detection_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (channel, message_id, image_path) DO NOTHING
            "#,
        )
        .bind(&record.channel)
        .bind(record.message_id)
        .bind(&record.image_path)
        .bind(detections)
        .bind(record.detections.len() as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_message(&self, channel: &str, message_id: i64) -> Result<Vec<DetectionRecord>> {
        let rows: Vec<(String, i64, String, String)> = sqlx::query_as(
            "SELECT channel, message_id, image_path, detections FROM image_detections
             WHERE channel = ? AND message_id = ?
             ORDER BY image_path",
        )
        .bind(channel)
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(channel, message_id, image_path, detections)| {
                Ok(DetectionRecord {
                    channel,
                    message_id,
                    image_path,
                    detections: serde_json::from_str(&detections)?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM image_detections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
