//! Raw message repository trait and implementation

use crate::error::Result;
use crate::models::RawMessage;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[async_trait]
pub trait RawMessageRepository: Send + Sync {
    /// Insert a raw message unless `(channel, message_id)` is already stored.
    ///
    /// # Returns
    /// - `Ok(true)` if the row was inserted
    /// - `Ok(false)` if it already existed
    async fn insert_if_absent(&self, message: &RawMessage) -> Result<bool>;

    async fn find(&self, channel: &str, message_id: i64) -> Result<Option<RawMessage>>;

    async fn count(&self) -> Result<i64>;

    async fn count_by_channel(&self, channel: &str) -> Result<i64>;
}

pub struct SqliteRawMessageRepository {
    pool: SqlitePool,
}

impl SqliteRawMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RawMessageRepository for SqliteRawMessageRepository {
    async fn insert_if_absent(&self, message: &RawMessage) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO telegram_messages (channel, message_id, message_date, raw, loaded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (channel, message_id) DO NOTHING
            "#,
        )
        .bind(&message.channel)
        .bind(message.message_id)
        .bind(&message.message_date)
        .bind(&message.raw)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, channel: &str, message_id: i64) -> Result<Option<RawMessage>> {
        let row: Option<(String, i64, Option<String>, String)> = sqlx::query_as(
            "SELECT channel, message_id, message_date, raw FROM telegram_messages
             WHERE channel = ? AND message_id = ?",
        )
        .bind(channel)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(channel, message_id, message_date, raw)| RawMessage {
            channel,
            message_id,
            message_date,
            raw,
        }))
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM telegram_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_channel(&self, channel: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM telegram_messages WHERE channel = ?")
                .bind(channel)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
