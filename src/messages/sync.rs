//! One-shot and monitor-mode archive sync.

use super::archive::{MergeReport, MessageArchive};
use super::fetcher::{DeltaFetcher, FetchSettings};
use super::source::MessageSource;
use crate::resilience::{PollSchedule, RetryPolicy, Shutdown};
use crate::{Error, Result};

/// Summary of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Merge counts.
    pub merge: MergeReport,
    /// Rate-limit pauses taken while fetching.
    pub rate_limit_waits: u32,
    /// Whether the archive file was rewritten.
    pub saved: bool,
}

/// Fetches the delta for an archive and merges it in.
pub struct MessageSync<'a, S: MessageSource + ?Sized> {
    source: &'a S,
    settings: FetchSettings,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl<'a, S: MessageSource + ?Sized> MessageSync<'a, S> {
    /// Creates a sync over `source`.
    #[must_use]
    pub const fn new(
        source: &'a S,
        settings: FetchSettings,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            source,
            settings,
            retry,
            shutdown,
        }
    }

    /// Runs a single watermark → fetch → merge → save pass.
    ///
    /// The archive is saved only when at least one message was added.
    ///
    /// # Errors
    ///
    /// Returns fetch errors (after retries) and save failures. The archive
    /// file is untouched on error.
    #[tracing::instrument(skip_all, fields(archive = %archive.path().display()))]
    pub fn run_once(&self, archive: &mut MessageArchive) -> Result<SyncReport> {
        let since = archive.latest_date();
        let known = archive.known_ids();
        match since {
            Some(since) => tracing::info!(%since, known = known.len(), "Syncing messages"),
            None => tracing::info!("Archive has no dated messages, fetching full history"),
        }

        let outcome = DeltaFetcher::new(self.source, self.settings, &self.retry, &self.shutdown)
            .fetch(since, &known)?;
        let merge = archive.merge(outcome.items);

        let saved = merge.added > 0;
        if saved {
            archive.save()?;
            metrics::counter!("daybook_messages_merged_total").increment(merge.added as u64);
            tracing::info!(added = merge.added, "Archive updated");
        } else {
            tracing::info!("No new messages");
        }

        Ok(SyncReport {
            merge,
            rate_limit_waits: outcome.rate_limit_waits,
            saved,
        })
    }

    /// Polls until shutdown, adapting the interval to what each poll finds.
    ///
    /// Poll failures are logged and slow the schedule down. The loop ends on
    /// shutdown.
    ///
    /// # Errors
    ///
    /// Returns precondition failures, which another poll cannot fix.
    pub fn monitor(&self, archive: &mut MessageArchive, schedule: &mut PollSchedule) -> Result<()> {
        tracing::info!(
            interval_secs = schedule.current().as_secs(),
            "Monitoring for new messages, press Ctrl+C to stop"
        );

        loop {
            tracing::debug!(wait_secs = schedule.current().as_secs(), "Waiting for next poll");
            if !self.shutdown.sleep(schedule.current()) {
                break;
            }

            match self.run_once(archive) {
                Ok(report) if report.rate_limit_waits > 0 => schedule.on_rate_limited(),
                Ok(report) if report.merge.added > 0 => schedule.on_items(),
                Ok(_) => schedule.on_empty(),
                Err(Error::Cancelled) => break,
                Err(e @ Error::Precondition(_)) => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Poll failed");
                    schedule.on_failure();
                },
            }
            tracing::info!(next_secs = schedule.current().as_secs(), "Poll complete");
        }

        tracing::info!("Monitoring stopped");
        Ok(())
    }
}
