//! Remote Channel Feed Abstraction
//!
//! A [`FeedSession`] is an authenticated connection to a channel provider. It is
//! created once per run by the host and handed explicitly to every component that
//! talks to the provider.
//!
//! Pages are returned newest-first. The ingestion engine relies on that ordering
//! to stop early once it walks past the lower date bound.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Attachment declared by a feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaDescriptor {
    Photo,
    Document {
        mime_type: Option<String>,
        file_name: Option<String>,
    },
    /// Any other attachment kind (web page previews, polls, geo points, ...)
    Other { kind: String },
}

impl MediaDescriptor {
    /// Photos and image documents are the only attachments we download.
    pub fn is_image(&self) -> bool {
        match self {
            Self::Photo => true,
            Self::Document { mime_type, .. } => mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with("image")),
            Self::Other { .. } => false,
        }
    }

    /// Original file name supplied by the sender, when there is one.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Document { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }
}

/// A single channel post.
///
/// This is also the shape of one line in the on-disk item log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub id: i64,
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub reply_to_msg_id: Option<i64>,
    #[serde(default)]
    pub is_forward: bool,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
}

impl FeedMessage {
    pub fn new(id: i64, date: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            peer_id: None,
            date,
            sender_id: None,
            text: None,
            views: None,
            forwards: None,
            reply_to_msg_id: None,
            is_forward: false,
            media: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_media(mut self, media: MediaDescriptor) -> Self {
        self.media = Some(media);
        self
    }

    /// Returns the attachment if it is one we download.
    pub fn image_media(&self) -> Option<&MediaDescriptor> {
        self.media.as_ref().filter(|media| media.is_image())
    }
}

/// Resolved channel metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// One page of a newest-first listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub messages: Vec<FeedMessage>,
    /// Offset to pass for the next (older) page; `None` when the listing is exhausted.
    pub next_offset: Option<i64>,
}

/// Authenticated channel provider session.
///
/// # Errors
///
/// Implementations must surface provider flood control as
/// [`BridgeError::RateLimited`](crate::error::BridgeError::RateLimited) and
/// transport failures as transient errors so callers can apply the right policy.
#[async_trait]
pub trait FeedSession: Send + Sync {
    /// Resolve a channel handle (username, link or numeric id).
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelInfo>;

    /// Fetch a page of messages older than `offset` (newest-first).
    ///
    /// `offset = None` starts from the newest message.
    async fn fetch_page(
        &self,
        channel: &str,
        offset: Option<i64>,
        page_size: u32,
    ) -> Result<FeedPage>;

    /// Download the binary attachment of a message.
    async fn download_media(&self, channel: &str, message_id: i64) -> Result<Bytes>;
}
