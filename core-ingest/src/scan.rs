//! # Channel Scan Loop
//!
//! Walks one channel's feed newest-first and persists every new item.
//!
//! ## Workflow
//!
//! 1. Open the channel through the session. Flood control here escapes as
//!    [`ScanError::RateLimited`] so the coordinator can retry the whole channel.
//! 2. In incremental mode build the [`DedupIndex`] from the item log.
//! 3. For each item, in provider order:
//!    - already saved (on disk or earlier in this pass): skip, not counted
//!    - dated before `since`: stop the whole channel
//!    - dated on or after `until`: skip this item only
//!    - otherwise append it to its date partition and, if it carries an image,
//!      download the image before moving on
//! 4. Stop once `limit` items were persisted. Every `courtesy_every` items,
//!    pause briefly.
//!
//! Cancellation is checked between items only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let scanner = ChannelScanner::new(session.clone(), layout.clone(), &ScanSettings::default());
//! let report = scanner
//!     .scan("CheMed123", &ScanOptions::default().incremental(true))
//!     .await?;
//! println!("{} new items", report.processed);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{Clock, FeedSession, SystemClock};
use chrono::NaiveDate;
use core_runtime::config::ScanSettings;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::cursor::FeedCursor;
use crate::dedup::DedupIndex;
use crate::error::{IngestError, ScanError};
use crate::item_log::append_item;
use crate::layout::DataLayout;
use crate::media::MediaFetcher;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Per-run filters applied to every channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOptions {
    /// Maximum number of newly persisted items per channel
    pub limit: Option<usize>,
    /// Skip items already present in the item log
    pub incremental: bool,
    /// Inclusive lower date bound
    pub since: Option<NaiveDate>,
    /// Exclusive upper date bound
    pub until: Option<NaiveDate>,
}

impl ScanOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since >= until {
                return Err(IngestError::InvalidOptions(format!(
                    "since ({}) must be earlier than until ({})",
                    since, until
                )));
            }
        }
        Ok(())
    }
}

/// Scan state, reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Scanning,
    Filtering,
    Persisting,
    MediaCheck,
    Done,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Filtering => "filtering",
            Self::Persisting => "persisting",
            Self::MediaCheck => "media_check",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with one feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDecision {
    AlreadySaved,
    /// Older than `since`; nothing after it can qualify
    Halt,
    AfterUntil,
    Persist,
}

/// Decide how to handle an item. Dedup takes precedence over the date bounds.
pub fn classify(
    id: i64,
    date: NaiveDate,
    saved: &DedupIndex,
    seen_this_pass: &HashSet<i64>,
    options: &ScanOptions,
) -> ItemDecision {
    if saved.contains(id) || seen_this_pass.contains(&id) {
        return ItemDecision::AlreadySaved;
    }
    if options.since.is_some_and(|since| date < since) {
        return ItemDecision::Halt;
    }
    if options.until.is_some_and(|until| date >= until) {
        return ItemDecision::AfterUntil;
    }
    ItemDecision::Persist
}

/// Outcome of a completed channel scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub channel: String,
    /// Items newly persisted
    pub processed: usize,
    pub skipped_saved: usize,
    pub skipped_after_until: usize,
    /// Whether the scan stopped at the `since` boundary
    pub halted_at_since: bool,
    pub media_saved: usize,
    pub media_failed: usize,
}

impl ScanReport {
    fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            ..Default::default()
        }
    }
}

pub struct ChannelScanner {
    session: Arc<dyn FeedSession>,
    layout: DataLayout,
    executor: RetryExecutor,
    media: MediaFetcher,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    page_size: u32,
    courtesy_every: usize,
    courtesy_pause: Duration,
}

impl ChannelScanner {
    pub fn new(session: Arc<dyn FeedSession>, layout: DataLayout, settings: &ScanSettings) -> Self {
        let executor = RetryExecutor::new(RetryPolicy::from(settings));
        let media = MediaFetcher::new(session.clone(), layout.clone(), executor.clone());

        Self {
            session,
            layout,
            executor,
            media,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            page_size: settings.page_size,
            courtesy_every: settings.courtesy_every,
            courtesy_pause: settings.courtesy_pause,
        }
    }

    /// Clock used to date items the provider returns without a timestamp
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    #[instrument(skip(self, options), fields(incremental = options.incremental))]
    pub async fn scan(&self, channel: &str, options: &ScanOptions) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::new(channel);

        let info = self.session.resolve_channel(channel).await?;
        debug!(channel_id = info.id, title = ?info.title, "Resolved channel");

        let saved = if options.incremental {
            DedupIndex::build(&self.layout, channel)
                .await
                .map_err(|source| ScanError::Io {
                    processed: 0,
                    source,
                })?
        } else {
            DedupIndex::empty()
        };
        debug!(saved = saved.len(), "Dedup index ready");

        if options.limit == Some(0) {
            return Ok(report);
        }

        let mut seen_this_pass = HashSet::new();
        let mut cursor =
            FeedCursor::new(self.session.as_ref(), &self.executor, channel, self.page_size);

        loop {
            if self.cancel.is_cancelled() {
                info!(processed = report.processed, "Scan cancelled");
                return Err(ScanError::Cancelled {
                    processed: report.processed,
                });
            }

            let message = match cursor.next().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(source) => {
                    return Err(ScanError::Feed {
                        processed: report.processed,
                        source,
                    })
                }
            };

            let date = message
                .date
                .map(|d| d.date_naive())
                .unwrap_or_else(|| self.clock.today());

            match classify(message.id, date, &saved, &seen_this_pass, options) {
                ItemDecision::AlreadySaved => {
                    report.skipped_saved += 1;
                    continue;
                }
                ItemDecision::Halt => {
                    debug!(
                        phase = %ScanPhase::Filtering,
                        message_id = message.id,
                        %date,
                        "Reached since boundary"
                    );
                    report.halted_at_since = true;
                    break;
                }
                ItemDecision::AfterUntil => {
                    report.skipped_after_until += 1;
                    continue;
                }
                ItemDecision::Persist => {}
            }

            let path = self.layout.item_log_path(channel, date);
            append_item(&path, &message)
                .await
                .map_err(|source| ScanError::Io {
                    processed: report.processed,
                    source,
                })?;
            seen_this_pass.insert(message.id);
            debug!(phase = %ScanPhase::Persisting, message_id = message.id, %date, "Persisted item");

            if message.image_media().is_some() {
                debug!(phase = %ScanPhase::MediaCheck, message_id = message.id, "Fetching image");
                match self.media.fetch(channel, &message, date).await {
                    Some(_) => report.media_saved += 1,
                    None => report.media_failed += 1,
                }
            }

            report.processed += 1;

            if options.limit.is_some_and(|limit| report.processed >= limit) {
                break;
            }

            if self.courtesy_every > 0 && report.processed % self.courtesy_every == 0 {
                tokio::time::sleep(self.courtesy_pause).await;
            }
        }

        info!(
            phase = %ScanPhase::Done,
            processed = report.processed,
            skipped_saved = report.skipped_saved,
            skipped_after_until = report.skipped_after_until,
            media_saved = report.media_saved,
            media_failed = report.media_failed,
            pages = cursor.pages(),
            "Finished channel"
        );

        Ok(report)
    }
}
