//! Text steps of the daily run: previous-entry reference, task carryover, trailer.

use crate::document::Document;
use crate::watermark::DATE_FORMAT;
use chrono::{Days, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Section collecting upcoming tasks.
pub const ANTICIPATION_TITLE: &str = "Due in the next two weeks - Anticipation";

/// Section the previous-entry reference goes under.
pub const LIFE_TITLE: &str = "Life";

const OPEN_TASK_PREFIX: &str = "- [ ]";

static TRAILER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"<small>Last modified:.*?</small>").ok());

/// Where today's note stands relative to the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryGap {
    /// Today.
    pub today: NaiveDate,
    /// Most recent note before today.
    pub last: NaiveDate,
    /// Days between the two.
    pub days: i64,
}

impl EntryGap {
    /// Gap from `last` to `today`.
    #[must_use]
    pub fn new(today: NaiveDate, last: NaiveDate) -> Self {
        Self {
            today,
            last,
            days: (today - last).num_days(),
        }
    }

    /// Cross-reference line for today's note.
    #[must_use]
    pub fn reference(&self) -> String {
        if self.days == 1 {
            format!(" Yesterday's note: [[{}]]", self.last.format(DATE_FORMAT))
        } else {
            format!(
                " The last journal entry was [[{}]], which was {} days ago",
                self.last.format(DATE_FORMAT),
                self.days
            )
        }
    }

    /// Comment placed before tasks carried across a multi-day gap.
    #[must_use]
    pub fn provenance(&self) -> Option<String> {
        (self.days > 1).then(|| {
            format!(
                "<!-- Tasks carried over from {}, {} days ago -->",
                self.last.format(DATE_FORMAT),
                self.days
            )
        })
    }

    fn yesterday(&self) -> NaiveDate {
        self.today - Days::new(1)
    }
}

/// Adds the previous-entry reference unless one is already there.
///
/// The line goes directly under `## Life`, or at the end of the note when
/// there is no such section. Returns whether the document changed.
pub fn add_previous_reference(doc: &mut Document, gap: &EntryGap) -> bool {
    let yesterday_ref = format!(" Yesterday's note: [[{}]]", gap.yesterday().format(DATE_FORMAT));
    let last_ref = format!(" The last journal entry was [[{}]]", gap.last.format(DATE_FORMAT));
    if doc.contains_text(&yesterday_ref) || doc.contains_text(&last_ref) {
        tracing::debug!("Previous entry reference already present");
        return false;
    }

    let reference = gap.reference();
    if !doc.insert_after_heading(LIFE_TITLE, &reference) {
        tracing::warn!("No '## Life' section, appending reference at the end");
        doc.append_paragraph(&[reference]);
    }
    true
}

/// Open `- [ ]` lines from a note's anticipation section.
#[must_use]
pub fn open_tasks(doc: &Document) -> Vec<String> {
    doc.section(ANTICIPATION_TITLE)
        .map(|section| {
            section
                .body()
                .iter()
                .filter(|line| line.trim().starts_with(OPEN_TASK_PREFIX))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Appends tasks not yet anywhere in today's note.
///
/// Returns the lines actually added.
pub fn carry_tasks(doc: &mut Document, tasks: &[String], gap: &EntryGap) -> Vec<String> {
    let provenance = gap.provenance();
    doc.append_unique(ANTICIPATION_TITLE, tasks, provenance.as_deref())
}

/// Removes every modification trailer. Returns how many were found.
pub fn strip_trailers(doc: &mut Document) -> usize {
    TRAILER.as_ref().map_or(0, |pattern| doc.strip_matching(pattern))
}

/// Replaces any modification trailers with one stamped `now`.
pub fn stamp_trailer(doc: &mut Document, now: NaiveDateTime) {
    strip_trailers(doc);
    doc.append_paragraph(&[trailer(now)]);
}

/// `<small>Last modified: YYYY-MM-DD HH:MM:SS</small>`
#[must_use]
pub fn trailer(now: NaiveDateTime) -> String {
    format!("<small>Last modified: {}</small>", now.format("%Y-%m-%d %H:%M:%S"))
}
