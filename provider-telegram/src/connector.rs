//! Telegram gateway connector implementation
//!
//! Implements the `FeedSession` trait over the JSON API of an MTProto gateway.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::{ChannelInfo, FeedPage, FeedSession};
use bytes::Bytes;
use core_runtime::config::{HarvestConfig, TelegramCredentials};
use core_runtime::logging::redact_if_sensitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::TelegramError;
use crate::types::{GatewayChannel, GatewayErrorBody, GatewayMessage, GatewayPage};

/// Wait used when a flood-wait response carries no duration
const DEFAULT_FLOOD_WAIT_SECS: u64 = 60;

/// Upper bound on a single flood wait; larger values are clamped
const MAX_FLOOD_WAIT_SECS: u64 = 86_400;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Media downloads can be large
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Telegram gateway connector
///
/// Every call is a single HTTP request. Provider flood control surfaces as
/// `BridgeError::RateLimited` and 5xx/transport failures as transient errors;
/// the ingestion engine owns retries.
///
/// # Example
///
/// ```ignore
/// use provider_telegram::TelegramGatewayConnector;
///
/// let session = TelegramGatewayConnector::from_config(http_client, &config)?;
/// let page = session.fetch_page("CheMed123", None, 100).await?;
/// ```
pub struct TelegramGatewayConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    credentials: TelegramCredentials,
}

impl TelegramGatewayConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        credentials: TelegramCredentials,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Build from configuration, failing fast when the gateway URL or the
    /// credentials are missing.
    pub fn from_config(
        http_client: Arc<dyn HttpClient>,
        config: &HarvestConfig,
    ) -> core_runtime::error::Result<Self> {
        let base_url = config.require_gateway_url()?.to_string();
        let credentials = config.require_telegram()?.clone();

        info!(
            gateway = %base_url,
            api_id = credentials.api_id,
            session = %redact_if_sensitive("session", &credentials.session),
            "Telegram gateway configured"
        );
        Ok(Self::new(http_client, base_url, credentials))
    }

    fn channel_url(&self, channel: &str) -> String {
        format!(
            "{}/v1/channels/{}",
            self.base_url,
            urlencoding::encode(channel.trim_start_matches('@'))
        )
    }

    fn request(&self, url: String, timeout: Duration) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, url)
            .header("X-Api-Id", self.credentials.api_id.to_string())
            .header("X-Api-Hash", self.credentials.api_hash.clone())
            .header("X-Session", self.credentials.session.clone())
            .header("Accept", "application/json")
            .timeout(timeout)
    }

    /// Execute once and map non-2xx statuses onto the error taxonomy.
    async fn get(&self, url: String, timeout: Duration, resource: &str) -> Result<HttpResponse> {
        let response = self.http_client.execute(self.request(url, timeout)).await?;

        if response.is_success() {
            return Ok(response);
        }

        Err(Self::status_error(&response, resource).into())
    }

    fn status_error(response: &HttpResponse, resource: &str) -> TelegramError {
        let body: GatewayErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
        let message = body
            .error
            .clone()
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string());

        match response.status {
            420 | 429 => {
                let seconds = response
                    .header("Retry-After")
                    .and_then(|v| v.trim().parse().ok())
                    .or(body.retry_after)
                    .unwrap_or(DEFAULT_FLOOD_WAIT_SECS)
                    .min(MAX_FLOOD_WAIT_SECS);
                warn!(resource, seconds, "Gateway requested flood wait");
                TelegramError::FloodWait { seconds }
            }
            404 => TelegramError::NotFound(resource.to_string()),
            status if response.is_client_error() => TelegramError::Rejected { status, message },
            status => TelegramError::Server { status, message },
        }
    }
}

#[async_trait]
impl FeedSession for TelegramGatewayConnector {
    #[instrument(skip(self))]
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelInfo> {
        let response = self
            .get(self.channel_url(channel), REQUEST_TIMEOUT, channel)
            .await?;

        let resolved: GatewayChannel = response.json()?;
        debug!(channel_id = resolved.id, "Channel resolved");
        Ok(resolved.into_channel_info(channel))
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, channel: &str, offset: Option<i64>, page_size: u32) -> Result<FeedPage> {
        let mut url = format!("{}/messages?limit={}", self.channel_url(channel), page_size);
        if let Some(offset_id) = offset {
            url.push_str(&format!("&offset_id={}", offset_id));
        }

        let response = self.get(url, REQUEST_TIMEOUT, channel).await?;
        let page: GatewayPage = response.json()?;

        let mut messages = Vec::with_capacity(page.messages.len());
        for entry in page.messages {
            match serde_json::from_value::<GatewayMessage>(entry) {
                Ok(message) => messages.push(message.into_feed_message()),
                Err(e) => warn!(error = %e, "Skipping undecodable message entry"),
            }
        }

        debug!(count = messages.len(), next_offset = ?page.next_offset_id, "Fetched page");
        Ok(FeedPage {
            messages,
            next_offset: page.next_offset_id,
        })
    }

    #[instrument(skip(self))]
    async fn download_media(&self, channel: &str, message_id: i64) -> Result<Bytes> {
        let url = format!("{}/messages/{}/media", self.channel_url(channel), message_id);
        let resource = format!("{}/{}", channel, message_id);

        let response = self.get(url, DOWNLOAD_TIMEOUT, &resource).await?;
        debug!(bytes = response.body.len(), "Downloaded media");
        Ok(response.body)
    }
}
