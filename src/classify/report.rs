//! CSV report of classifier matches.

use super::verdict::Verdict;
use crate::document::AlternatePathWriter;
use crate::messages::Message;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest context snippet kept in a row.
pub const CONTEXT_LIMIT: usize = 500;

/// One matched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM:SS`.
    pub time: String,
    /// Hour of day.
    pub hour: u32,
    /// Full weekday name.
    pub weekday: String,
    /// Full month name.
    pub month: String,
    /// Calendar year.
    pub year: i32,
    /// Message text.
    pub text: String,
    /// Truncated context snippet.
    pub context: String,
    /// Recorded answer.
    #[serde(rename = "match")]
    pub answer: String,
    /// Bracketed type.
    pub match_type: String,
    /// Bracketed first argument.
    pub match_arg1: String,
    /// Bracketed remainder.
    pub match_arg2: String,
    /// Attachment kind from the export, empty for plain text.
    pub media_type: String,
    /// Sender display name.
    pub sender: String,
    /// Source message id.
    pub message_id: i64,
    /// Original author of a forwarded message.
    pub forwarded_from: String,
    /// Unix seconds as exported.
    pub date_unixtime: String,
    #[serde(skip)]
    timestamp: NaiveDateTime,
}

impl ReportRow {
    /// Builds a row for `message`; `None` when the verdict is not a match.
    #[must_use]
    pub fn new(
        message: &Message,
        timestamp: NaiveDateTime,
        text: String,
        context: &str,
        verdict: &Verdict,
    ) -> Option<Self> {
        let Verdict::Match {
            answer,
            kind,
            arg1,
            arg2,
        } = verdict
        else {
            return None;
        };

        Some(Self {
            date: timestamp.format("%Y-%m-%d").to_string(),
            time: timestamp.format("%H:%M:%S").to_string(),
            hour: timestamp.hour(),
            weekday: timestamp.format("%A").to_string(),
            month: timestamp.format("%B").to_string(),
            year: timestamp.year(),
            text,
            context: truncate_context(context),
            answer: answer.clone(),
            match_type: kind.clone(),
            match_arg1: arg1.clone(),
            match_arg2: arg2.clone(),
            media_type: extra_field(message, "media_type"),
            sender: message.from.clone().unwrap_or_default(),
            message_id: message.id,
            forwarded_from: extra_field(message, "forwarded_from"),
            date_unixtime: message.date_unixtime.clone().unwrap_or_default(),
            timestamp,
        })
    }
}

fn extra_field(message: &Message, key: &str) -> String {
    match message.extra.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn truncate_context(context: &str) -> String {
    match context.char_indices().nth(CONTEXT_LIMIT) {
        Some((cut, _)) => format!("{}...", &context[..cut]),
        None => context.to_string(),
    }
}

/// `{output_dir}/{archive stem}_matches.csv`
#[must_use]
pub fn report_path(output_dir: &Path, archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map_or_else(|| "messages".into(), |s| s.to_string_lossy());
    output_dir.join(format!("{stem}_matches.csv"))
}

#[derive(Deserialize)]
struct StoredRow {
    #[serde(rename = "match")]
    answer: String,
    message_id: String,
}

/// Answers from an earlier report, keyed by message id.
///
/// A missing or unreadable report yields an empty map.
#[must_use]
pub fn load_previous(path: &Path) -> HashMap<i64, String> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No previous report");
            return HashMap::new();
        },
    };

    let previous: HashMap<i64, String> = reader
        .deserialize::<StoredRow>()
        .filter_map(std::result::Result::ok)
        .filter_map(|row| row.message_id.trim().parse().ok().map(|id| (id, row.answer)))
        .collect();
    tracing::info!(path = %path.display(), results = previous.len(), "Loaded previous results");
    previous
}

/// Writes rows oldest first.
///
/// Returns the path written, which differs from `path` when the preferred
/// file was locked.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if encoding fails or no candidate path
/// is writable.
pub fn write_report(
    path: &Path,
    mut rows: Vec<ReportRow>,
    writer: &AlternatePathWriter,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    rows.sort_by_key(|row| (row.timestamp, row.message_id));

    let mut csv = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        csv.serialize(row).map_err(|e| Error::failed("encode_report", e))?;
    }
    let bytes = csv
        .into_inner()
        .map_err(|e| Error::failed("encode_report", e))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| Error::failed("create_report_dir", e))?;
    }
    writer.write(path, &bytes, now)
}
