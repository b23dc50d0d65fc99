//! Newest-first feed iteration over a [`FeedSession`].
//!
//! Each page fetch runs through the [`RetryExecutor`], so a rate-limit signal
//! mid-iteration pauses and then repeats the same page request. Iteration
//! resumes at the cursor's current offset; nothing is re-listed.

use std::collections::VecDeque;

use bridge_traits::{FeedMessage, FeedSession};
use tracing::trace;

use crate::retry::{RetryExecutor, RetryExhausted};

pub struct FeedCursor<'a> {
    session: &'a dyn FeedSession,
    executor: &'a RetryExecutor,
    channel: &'a str,
    page_size: u32,
    offset: Option<i64>,
    buffer: VecDeque<FeedMessage>,
    exhausted: bool,
    pages: usize,
}

impl<'a> FeedCursor<'a> {
    pub fn new(
        session: &'a dyn FeedSession,
        executor: &'a RetryExecutor,
        channel: &'a str,
        page_size: u32,
    ) -> Self {
        Self {
            session,
            executor,
            channel,
            page_size,
            offset: None,
            buffer: VecDeque::new(),
            exhausted: false,
            pages: 0,
        }
    }

    /// Next message in provider order, or `None` once the feed is exhausted.
    pub async fn next(&mut self) -> Result<Option<FeedMessage>, RetryExhausted> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            if self.exhausted {
                return Ok(None);
            }

            let session = self.session;
            let channel = self.channel;
            let offset = self.offset;
            let page_size = self.page_size;
            let label = format!("fetch page of {} at offset {:?}", channel, offset);

            let page = self
                .executor
                .run(&label, move || session.fetch_page(channel, offset, page_size))
                .await?;

            self.pages += 1;
            trace!(
                channel,
                page = self.pages,
                messages = page.messages.len(),
                next_offset = ?page.next_offset,
                "Fetched feed page"
            );

            // A provider that repeats the same offset would loop forever.
            self.exhausted = page.next_offset.is_none() || page.next_offset == offset;
            self.offset = page.next_offset;
            self.buffer.extend(page.messages);
        }
    }

    /// Number of pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }
}
