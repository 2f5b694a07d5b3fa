//! Rolling summaries over recent notes.

use crate::document::HEADING_PREFIX;
use crate::watermark::DATE_FORMAT;
use chrono::{Days, NaiveDate};
use std::path::Path;

/// One rolling summary section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWindow {
    /// Section title, without the `## ` marker.
    pub title: &'static str,
    /// Days looked back, not counting today.
    pub days: u64,
    /// Instruction placed before the notes.
    pub prompt: String,
}

impl SummaryWindow {
    /// `## 7-Day Summary`.
    #[must_use]
    pub fn seven_day(prompt: impl Into<String>) -> Self {
        Self {
            title: "7-Day Summary",
            days: 7,
            prompt: prompt.into(),
        }
    }

    /// `## 30-Day Summary`.
    #[must_use]
    pub fn thirty_day(prompt: impl Into<String>) -> Self {
        Self {
            title: "30-Day Summary",
            days: 30,
            prompt: prompt.into(),
        }
    }

    /// Prompt for this window, or `None` when no notes exist in it.
    #[must_use]
    pub fn build_prompt(&self, dir: &Path, today: NaiveDate) -> Option<String> {
        let input = collect_entries(dir, today, self.days);
        if input.is_empty() {
            return None;
        }
        Some(format!("{}\n\n{input}", self.prompt))
    }
}

/// Concatenates the notes from the `days` days before `today`, newest first.
///
/// Each note becomes `\n\n### {date}\n\n{content}\n\n`; missing days are
/// skipped.
#[must_use]
pub fn collect_entries(dir: &Path, today: NaiveDate, days: u64) -> String {
    let mut combined = String::new();
    for offset in 1..=days {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else {
            break;
        };
        let day = date.format(DATE_FORMAT).to_string();
        match std::fs::read_to_string(dir.join(format!("{day}.md"))) {
            Ok(content) => {
                combined.push_str(&format!("\n\n### {day}\n\n{content}\n\n"));
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!(date = %day, error = %e, "Skipping unreadable note"),
        }
    }
    combined
}

/// Model output as section body lines.
///
/// `## ` lines are demoted to `### ` so the summary stays one section.
#[must_use]
pub fn summary_lines(text: &str) -> Vec<String> {
    text.trim()
        .lines()
        .map(|line| {
            if line.starts_with(HEADING_PREFIX) {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect()
}
