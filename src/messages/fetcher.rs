//! Paginated delta fetch.

use super::models::Message;
use super::source::{FetchRequest, MessageSource};
use crate::config::MessagesConfig;
use crate::resilience::{RetryPolicy, Shutdown};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::time::Duration;

/// Pagination knobs.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Items per page.
    pub batch_size: usize,
    /// Pause between pages.
    pub batch_delay: Duration,
    /// Known ids in a row that end the fetch.
    pub max_consecutive_duplicates: usize,
    /// Rate-limit pauses tolerated per fetch.
    pub max_rate_limit_waits: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&MessagesConfig::default())
    }
}

impl FetchSettings {
    /// Reads the settings from the messages config.
    #[must_use]
    pub fn from_config(config: &MessagesConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay,
            max_consecutive_duplicates: config.max_consecutive_duplicates.max(1),
            max_rate_limit_waits: config.max_rate_limit_waits,
        }
    }
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned nothing.
    EmptyBatch,
    /// The page was smaller than requested.
    ShortBatch,
    /// Every item on the page was already known.
    AllDuplicates,
    /// Too many known ids in a row.
    DuplicateRun,
}

/// Result of one fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// New items, ascending by (timestamp, id).
    pub items: Vec<Message>,
    /// Why the loop ended.
    pub stop: StopReason,
    /// Pages requested successfully.
    pub batches: usize,
    /// Known ids encountered.
    pub duplicates: usize,
    /// Rate-limit pauses taken.
    pub rate_limit_waits: u32,
}

/// Pulls pages from a [`MessageSource`] until the known region is reached.
pub struct DeltaFetcher<'a, S: MessageSource + ?Sized> {
    source: &'a S,
    settings: FetchSettings,
    retry: &'a RetryPolicy,
    shutdown: &'a Shutdown,
}

impl<'a, S: MessageSource + ?Sized> DeltaFetcher<'a, S> {
    /// Creates a fetcher.
    pub const fn new(
        source: &'a S,
        settings: FetchSettings,
        retry: &'a RetryPolicy,
        shutdown: &'a Shutdown,
    ) -> Self {
        Self {
            source,
            settings,
            retry,
            shutdown,
        }
    }

    /// Fetches everything newer than the known region.
    ///
    /// # Errors
    ///
    /// Returns the source error once retries are exhausted, a transient error
    /// when rate-limit pauses run out, or [`Error::Cancelled`] on shutdown.
    #[tracing::instrument(skip(self, known), fields(known_ids = known.len()))]
    pub fn fetch(
        &self,
        since: Option<NaiveDateTime>,
        known: &HashSet<i64>,
    ) -> Result<FetchOutcome> {
        let batch_size = self.settings.batch_size.max(1);
        let mut seen = known.clone();
        let mut items = Vec::new();
        let mut offset = 0;
        let mut consecutive = 0;
        let mut duplicates = 0;
        let mut batches = 0;
        let mut rate_limit_waits = 0;

        let stop = 'pages: loop {
            self.shutdown.check()?;
            let request = FetchRequest {
                limit: batch_size,
                offset,
                since,
            };

            let batch = match self.retry.run_transient("fetch_messages", self.shutdown, |_| {
                self.source.fetch_batch(&request)
            }) {
                Ok(batch) => batch,
                Err(Error::RateLimited { retry_after, .. }) => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > self.settings.max_rate_limit_waits {
                        return Err(Error::Transient {
                            operation: "fetch_messages".to_string(),
                            cause: format!(
                                "still rate limited after {} waits",
                                self.settings.max_rate_limit_waits
                            ),
                        });
                    }
                    metrics::counter!("daybook_rate_limit_waits_total").increment(1);
                    tracing::warn!(
                        offset,
                        wait_secs = retry_after.as_secs(),
                        "Rate limited, retrying the same page"
                    );
                    if !self.shutdown.sleep(retry_after) {
                        return Err(Error::Cancelled);
                    }
                    continue;
                },
                Err(e) => return Err(e),
            };
            batches += 1;

            if batch.is_empty() {
                break StopReason::EmptyBatch;
            }

            let page_len = batch.len();
            let mut page_duplicates = 0;
            for message in batch {
                if seen.contains(&message.id) {
                    page_duplicates += 1;
                    duplicates += 1;
                    consecutive += 1;
                    if consecutive >= self.settings.max_consecutive_duplicates {
                        break 'pages StopReason::DuplicateRun;
                    }
                } else {
                    consecutive = 0;
                    seen.insert(message.id);
                    items.push(message);
                }
            }
            tracing::debug!(offset, page_len, page_duplicates, "Fetched page");

            if page_duplicates == page_len {
                break StopReason::AllDuplicates;
            }
            offset += page_len;
            if page_len < batch_size {
                break StopReason::ShortBatch;
            }

            if !self.settings.batch_delay.is_zero() && !self.shutdown.sleep(self.settings.batch_delay)
            {
                return Err(Error::Cancelled);
            }
        };

        items.sort_by_key(Message::sort_key);
        metrics::counter!("daybook_messages_fetched_total").increment(items.len() as u64);
        tracing::info!(
            new = items.len(),
            duplicates,
            batches,
            stop = ?stop,
            "Fetch finished"
        );

        Ok(FetchOutcome {
            items,
            stop,
            batches,
            duplicates,
            rate_limit_waits,
        })
    }
}
