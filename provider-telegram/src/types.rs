//! Telegram gateway response types
//!
//! Data structures for deserializing gateway JSON and converting it into
//! [`FeedMessage`] values.

use bridge_traits::{ChannelInfo, FeedMessage, MediaDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `GET /v1/channels/{channel}`
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayChannel {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl GatewayChannel {
    pub fn into_channel_info(self, requested: &str) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            username: self.username.unwrap_or_else(|| requested.to_string()),
            title: self.title,
        }
    }
}

/// `GET /v1/channels/{channel}/messages`
///
/// Entries are kept as raw JSON so one malformed message does not fail the page.
#[derive(Debug, Deserialize)]
pub struct GatewayPage {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub next_offset_id: Option<i64>,
}

/// Error body returned alongside 4xx/5xx statuses
#[derive(Debug, Default, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds to wait, present on flood-wait responses
    #[serde(default)]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayMedia {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl GatewayMedia {
    /// Accepts both short (`photo`) and MTProto-style (`MessageMediaPhoto`) names.
    pub fn into_descriptor(self) -> MediaDescriptor {
        let normalized = self.kind.to_ascii_lowercase();
        let short = normalized.strip_prefix("messagemedia").unwrap_or(&normalized);

        match short {
            "photo" => MediaDescriptor::Photo,
            "document" => MediaDescriptor::Document {
                mime_type: self.mime_type,
                file_name: self.file_name,
            },
            _ => MediaDescriptor::Other { kind: self.kind },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayMessage {
    pub id: i64,
    #[serde(default, deserialize_with = "id_as_string")]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "id_as_string")]
    pub sender_id: Option<String>,
    /// Message text; MTProto calls it `message`
    #[serde(default, alias = "text")]
    pub message: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub reply_to_msg_id: Option<i64>,
    /// Present (non-null) when the message was forwarded
    #[serde(default)]
    pub fwd_from: Option<Value>,
    #[serde(default)]
    pub media: Option<GatewayMedia>,
}

impl GatewayMessage {
    pub fn into_feed_message(self) -> FeedMessage {
        FeedMessage {
            id: self.id,
            peer_id: self.peer_id,
            date: self.date,
            sender_id: self.sender_id,
            text: self.message,
            views: self.views,
            forwards: self.forwards,
            reply_to_msg_id: self.reply_to_msg_id,
            is_forward: self.fwd_from.is_some_and(|v| !v.is_null()),
            media: self.media.map(GatewayMedia::into_descriptor),
        }
    }
}

/// Ids arrive as numbers or strings depending on the peer type.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
