//! Daily journal carryover.
//!
//! One run brings today's note up to date: it is created from the template if
//! needed, linked to the previous entry, given any unfinished anticipation
//! tasks from that entry, refreshed with rolling summaries, and stamped. The
//! note is rendered and saved once. Re-running with the same clock and the same
//! model output leaves the file byte-identical.

mod carryover;
mod summary;

pub use carryover::{
    ANTICIPATION_TITLE, EntryGap, LIFE_TITLE, add_previous_reference, carry_tasks, open_tasks,
    stamp_trailer, strip_trailers, trailer,
};
pub use summary::{SummaryWindow, collect_entries, summary_lines};

use crate::config::JournalConfig;
use crate::document::{Document, Placement, save_atomic};
use crate::git::JournalRepo;
use crate::instance::{SingleInstanceGuard, dir_lock_path};
use crate::lifelog::{LifelogSource, LifelogSync, SyncOutcome};
use crate::llm::{LlmProvider, complete_with_retry};
use crate::resilience::{RetryPolicy, Shutdown};
use crate::watermark::{DATE_FORMAT, DirectoryScan};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

/// What a daily run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalReport {
    /// Today's note.
    pub path: PathBuf,
    /// Whether the note was created from the template.
    pub created: bool,
    /// Previous entry, if any.
    pub previous: Option<EntryGap>,
    /// Whether the previous-entry reference was added.
    pub reference_added: bool,
    /// Tasks carried into today.
    pub carried: Vec<String>,
    /// Summary sections rewritten.
    pub summaries: Vec<&'static str>,
    /// Whether the note file was rewritten.
    pub saved: bool,
    /// Lifelog sync result, when enabled and successful.
    pub lifelog: Option<SyncOutcome>,
    /// Commit id, when one was made.
    pub commit: Option<String>,
}

/// Runs the daily pipeline over a journal directory.
pub struct JournalService<'a> {
    config: JournalConfig,
    llm: Option<&'a dyn LlmProvider>,
    lifelog: Option<LifelogSync<Box<dyn LifelogSource + 'a>>>,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl<'a> JournalService<'a> {
    /// Creates a service. Summaries and lifelog sync stay off until their
    /// collaborators are attached.
    #[must_use]
    pub const fn new(config: JournalConfig, retry: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            config,
            llm: None,
            lifelog: None,
            retry,
            shutdown,
        }
    }

    /// Attaches the model used for summaries.
    #[must_use]
    pub fn with_llm(mut self, llm: &'a dyn LlmProvider) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Attaches the lifelog sync run after the note is saved.
    #[must_use]
    pub fn with_lifelog(mut self, sync: LifelogSync<Box<dyn LifelogSource + 'a>>) -> Self {
        self.lifelog = Some(sync);
        self
    }

    /// Path of the note for `date`.
    #[must_use]
    pub fn note_path(&self, date: NaiveDate) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.md", date.format(DATE_FORMAT)))
    }

    /// Runs the daily carryover for `now.date()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the journal directory or template is
    /// missing, [`Error::InstanceLocked`] if another run holds the journal
    /// directory, and read or write failures for today's note. Summary, lifelog
    /// and git failures are logged and do not fail the run.
    #[tracing::instrument(skip(self), fields(dir = %self.config.dir.display()))]
    pub fn run(&self, now: NaiveDateTime) -> Result<JournalReport> {
        self.check_preconditions()?;
        let _guard = SingleInstanceGuard::acquire(dir_lock_path(&self.config.dir))?;
        let today = now.date();
        let path = self.note_path(today);
        let mut report = JournalReport {
            path: path.clone(),
            ..JournalReport::default()
        };

        report.created = self.create_from_template(&path)?;
        let original = std::fs::read_to_string(&path).map_err(|e| {
            Error::failed("read_note", format!("{}: {e}", path.display()))
        })?;
        let mut doc = Document::parse(&original);
        strip_trailers(&mut doc);

        report.previous = DirectoryScan::new(&self.config.dir, today)
            .gap()
            .map(|(last, _)| EntryGap::new(today, last));
        match &report.previous {
            Some(gap) => tracing::info!(last = %gap.last, days = gap.days, "Found previous entry"),
            None => tracing::info!("No previous entry found"),
        }

        if let Some(gap) = &report.previous {
            report.reference_added = add_previous_reference(&mut doc, gap);
        }

        doc.ensure_section(ANTICIPATION_TITLE, Placement::End);
        doc.canonicalize(ANTICIPATION_TITLE);

        if let Some(gap) = &report.previous {
            report.carried = self.carry_from(&mut doc, gap);
        }

        report.summaries = self.update_summaries(&mut doc, today)?;

        stamp_trailer(&mut doc, now);
        let rendered = doc.render();
        if rendered != original {
            save_atomic(&path, &rendered)?;
            report.saved = true;
            tracing::info!(path = %path.display(), "Saved today's note");
        }

        if self.config.features.lifelog_sync {
            report.lifelog = self.sync_lifelog(now);
        }
        if self.config.features.git {
            report.commit = self.commit(today);
        }

        metrics::counter!("daybook_tasks_carried_total").increment(report.carried.len() as u64);
        Ok(report)
    }

    fn check_preconditions(&self) -> Result<()> {
        if !self.config.dir.is_dir() {
            return Err(Error::Precondition(format!(
                "journal directory not found: {}",
                self.config.dir.display()
            )));
        }
        if !self.config.template.is_file() {
            return Err(Error::Precondition(format!(
                "template not found: {}",
                self.config.template.display()
            )));
        }
        Ok(())
    }

    fn create_from_template(&self, path: &Path) -> Result<bool> {
        if path.exists() {
            tracing::debug!(path = %path.display(), "Today's note already exists");
            return Ok(false);
        }
        let template = std::fs::read(&self.config.template).map_err(|e| {
            Error::Precondition(format!(
                "template {} unreadable: {e}",
                self.config.template.display()
            ))
        })?;
        save_atomic(path, template)?;
        tracing::info!(path = %path.display(), "Created today's note from template");
        Ok(true)
    }

    fn carry_from(&self, doc: &mut Document, gap: &EntryGap) -> Vec<String> {
        let source = self.note_path(gap.last);
        let previous = match std::fs::read_to_string(&source) {
            Ok(text) => Document::parse(&text),
            Err(e) => {
                tracing::warn!(path = %source.display(), error = %e, "Cannot read previous entry");
                return Vec::new();
            },
        };

        let tasks = open_tasks(&previous);
        let carried = carry_tasks(doc, &tasks, gap);
        tracing::info!(
            open = tasks.len(),
            carried = carried.len(),
            from = %gap.last,
            "Carried over tasks"
        );
        carried
    }

    fn update_summaries(&self, doc: &mut Document, today: NaiveDate) -> Result<Vec<&'static str>> {
        let features = self.config.features;
        let windows = [
            (features.summary_7, SummaryWindow::seven_day(&self.config.summary_7_prompt)),
            (features.summary_30, SummaryWindow::thirty_day(&self.config.summary_30_prompt)),
        ];

        let mut updated = Vec::new();
        for (enabled, window) in windows {
            if !enabled {
                continue;
            }
            let Some(llm) = self.llm else {
                tracing::warn!(section = window.title, "No model configured, skipping summary");
                continue;
            };
            let Some(prompt) = window.build_prompt(&self.config.dir, today) else {
                tracing::info!(section = window.title, "No notes in window, skipping summary");
                continue;
            };

            match complete_with_retry(llm, &self.retry, &self.shutdown, &prompt) {
                Ok(text) => {
                    doc.upsert_body(window.title, &summary_lines(&text), Placement::End);
                    updated.push(window.title);
                    tracing::info!(section = window.title, "Summary updated");
                },
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(section = window.title, error = %e, "Summary skipped");
                },
            }
        }
        Ok(updated)
    }

    fn sync_lifelog(&self, now: NaiveDateTime) -> Option<SyncOutcome> {
        let Some(sync) = &self.lifelog else {
            tracing::warn!("Lifelog sync enabled but not configured");
            return None;
        };
        match sync.run(now) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "Lifelog sync failed");
                None
            },
        }
    }

    fn commit(&self, today: NaiveDate) -> Option<String> {
        let message = format!("Daily carryover for {}", today.format(DATE_FORMAT));
        match JournalRepo::new(&self.config.dir).commit_all(&message) {
            Ok(Some(oid)) => {
                tracing::info!(commit = %oid, "Committed journal");
                Some(oid.to_string())
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Git commit failed");
                None
            },
        }
    }
}
