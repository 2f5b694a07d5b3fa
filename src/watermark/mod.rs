//! Watermarks: how far a flow has already processed.
//!
//! Two representations live here. [`DirectoryScan`] infers the last journal day
//! from `YYYY-MM-DD.md` filenames; [`CounterFile`] persists a single date string
//! (the lifelog `.last_sync` file). The message archive carries its own watermark
//! (latest date plus known IDs), see [`crate::messages::MessageArchive`].
//!
//! Parse failures are never fatal: an unreadable or malformed watermark reads as
//! `None` and the caller falls back to its default window.

use crate::document::save_atomic;
use crate::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Date format used in filenames and watermark files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A source of the current watermark.
pub trait WatermarkSource {
    /// Returns the recorded mark, if any.
    fn read(&self) -> Option<NaiveDate>;
}

/// Finds the most recent `YYYY-MM-DD.md` file strictly before `today`.
#[derive(Debug, Clone)]
pub struct DirectoryScan {
    dir: PathBuf,
    today: NaiveDate,
}

impl DirectoryScan {
    /// Creates a scanner over `dir` relative to `today`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, today: NaiveDate) -> Self {
        Self {
            dir: dir.into(),
            today,
        }
    }

    /// The date being measured against.
    #[must_use]
    pub const fn today(&self) -> NaiveDate {
        self.today
    }

    /// Days between the last entry and today.
    #[must_use]
    pub fn gap(&self) -> Option<(NaiveDate, i64)> {
        self.read()
            .map(|last| (last, (self.today - last).num_days()))
    }
}

impl WatermarkSource for DirectoryScan {
    fn read(&self) -> Option<NaiveDate> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %self.dir.display(), error = %e, "Cannot scan directory");
                return None;
            },
        };

        entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| note_date(&entry.path()))
            .filter(|date| *date < self.today)
            .max()
    }
}

/// Parses the date from a `YYYY-MM-DD.md` path.
///
/// Only the zero-padded form counts; `2025-3-1.md` is not a daily note.
#[must_use]
pub fn note_date(path: &Path) -> Option<NaiveDate> {
    if path.extension()? != "md" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let date = NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()?;
    (date.format(DATE_FORMAT).to_string() == stem).then_some(date)
}

/// A single date persisted in a plain-text file.
#[derive(Debug, Clone)]
pub struct CounterFile {
    path: PathBuf,
}

impl CounterFile {
    /// Conventional file name for sync watermarks.
    pub const DEFAULT_NAME: &'static str = ".last_sync";

    /// Creates a handle; nothing is read until [`read`](WatermarkSource::read).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `.last_sync` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(Self::DEFAULT_NAME))
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the stored date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, mark: NaiveDate) -> Result<()> {
        save_atomic(&self.path, mark.format(DATE_FORMAT).to_string())?;
        tracing::debug!(path = %self.path.display(), mark = %mark, "Watermark written");
        Ok(())
    }

    /// Writes `mark` only if it is later than the stored date.
    ///
    /// Returns whether the watermark moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn advance(&self, mark: NaiveDate) -> Result<bool> {
        if self.read().is_some_and(|current| current >= mark) {
            return Ok(false);
        }
        self.write(mark)?;
        Ok(true)
    }
}

impl WatermarkSource for CounterFile {
    fn read(&self) -> Option<NaiveDate> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring malformed watermark"
                );
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_directory_scan_picks_latest_before_today() {
        let dir = TempDir::new().unwrap();
        for name in [
            "2025-02-27.md",
            "2025-03-01.md",
            "2025-03-04.md",
            "2025-03-02.md",
            "notes.md",
            "2025-02-30.md",
            "2025-03-03.txt",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let scan = DirectoryScan::new(dir.path(), date("2025-03-02"));
        assert_eq!(scan.read(), Some(date("2025-03-01")));
        assert_eq!(scan.gap(), Some((date("2025-03-01"), 1)));
    }

    #[test]
    fn test_directory_scan_missing_directory() {
        let scan = DirectoryScan::new("/nonexistent/journal", date("2025-03-02"));
        assert_eq!(scan.read(), None);
    }

    #[test_case("2025-03-01.md", Some("2025-03-01") ; "daily note")]
    #[test_case("2025-3-1.md", None ; "unpadded")]
    #[test_case("2025-03-1.md", None ; "unpadded day")]
    #[test_case("+2025-03-01.md", None ; "signed year")]
    #[test_case("2025-03-01.markdown", None ; "wrong extension")]
    #[test_case("Daily Template.md", None ; "template")]
    fn test_note_date(name: &str, expected: Option<&str>) {
        assert_eq!(note_date(Path::new(name)), expected.map(date));
    }

    #[test]
    fn test_counter_file_fail_soft_read() {
        let dir = TempDir::new().unwrap();
        let counter = CounterFile::in_dir(dir.path());
        assert_eq!(counter.read(), None);

        std::fs::write(counter.path(), "garbage").unwrap();
        assert_eq!(counter.read(), None);

        std::fs::write(counter.path(), "  2025-03-01\n").unwrap();
        assert_eq!(counter.read(), Some(date("2025-03-01")));
    }

    #[test]
    fn test_counter_file_advance_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let counter = CounterFile::in_dir(dir.path());

        assert!(counter.advance(date("2025-03-02")).unwrap());
        assert!(!counter.advance(date("2025-03-01")).unwrap());
        assert!(!counter.advance(date("2025-03-02")).unwrap());
        assert_eq!(counter.read(), Some(date("2025-03-02")));

        assert!(counter.advance(date("2025-03-05")).unwrap());
        assert_eq!(
            std::fs::read_to_string(counter.path()).unwrap(),
            "2025-03-05"
        );
    }
}
