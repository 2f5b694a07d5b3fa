//! Crash-safe file writes.

use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes `contents` to `path` through a temp file in the same directory.
///
/// Readers observe either the previous file or the complete new one, never a
/// partial write. An existing file keeps its permission bits.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the temp file cannot be created,
/// written, or renamed over the target.
pub fn save_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, contents.as_ref()).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Atomic write failed");
        Error::failed("write_file", format!("{}: {e}", path.display()))
    })
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".daybook-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    match std::fs::metadata(path) {
        Ok(existing) => tmp.as_file().set_permissions(existing.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => return Err(e),
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Writes a generated artifact, falling back to timestamped sibling names when
/// the preferred path is locked or not writable.
///
/// The fallback name is `{stem}_{YYYYmmdd_HHMMSS}.{ext}`, with `_{n}` appended
/// after the first fallback.
#[derive(Debug, Clone, Copy)]
pub struct AlternatePathWriter {
    max_alternates: usize,
}

impl Default for AlternatePathWriter {
    fn default() -> Self {
        Self { max_alternates: 3 }
    }
}

impl AlternatePathWriter {
    /// Creates a writer with a custom fallback budget.
    #[must_use]
    pub const fn new(max_alternates: usize) -> Self {
        Self { max_alternates }
    }

    /// Writes `contents` atomically, returning the path actually written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if every candidate path fails.
    pub fn write(&self, preferred: &Path, contents: &[u8], now: NaiveDateTime) -> Result<PathBuf> {
        self.write_with(preferred, now, |path| write_atomic(path, contents))
    }

    /// Same as [`write`](Self::write) with a caller-supplied write step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if every candidate path fails.
    pub fn write_with<F>(&self, preferred: &Path, now: NaiveDateTime, mut write: F) -> Result<PathBuf>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let mut last_error = None;
        for attempt in 0..=self.max_alternates {
            let candidate = if attempt == 0 {
                preferred.to_path_buf()
            } else {
                alternate_path(preferred, now, attempt)
            };

            match write(&candidate) {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::warn!(
                            preferred = %preferred.display(),
                            written = %candidate.display(),
                            "Preferred output was locked, wrote alternate file"
                        );
                    }
                    return Ok(candidate);
                },
                Err(e) if is_conflict(&e) => {
                    tracing::debug!(path = %candidate.display(), error = %e, "Output path unavailable");
                    last_error = Some(e);
                },
                Err(e) => {
                    return Err(Error::failed(
                        "write_output",
                        format!("{}: {e}", candidate.display()),
                    ));
                },
            }
        }

        Err(Error::failed(
            "write_output",
            format!(
                "{} and {} alternates unavailable: {}",
                preferred.display(),
                self.max_alternates,
                last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string())
            ),
        ))
    }
}

fn is_conflict(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}

fn alternate_path(preferred: &Path, now: NaiveDateTime, attempt: usize) -> PathBuf {
    let stem = preferred
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    let stamp = now.format("%Y%m%d_%H%M%S");
    let suffix = if attempt > 1 {
        format!("_{attempt}")
    } else {
        String::new()
    };
    let name = match preferred.extension() {
        Some(ext) => format!("{stem}_{stamp}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}{suffix}"),
    };
    preferred.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 2)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_save_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "old").unwrap();

        save_atomic(&path, "new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_atomic_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        save_atomic(&path, "new").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_save_atomic_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("note.md");
        assert!(matches!(
            save_atomic(&path, "x"),
            Err(Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_alternate_writer_prefers_original_path() {
        let dir = TempDir::new().unwrap();
        let preferred = dir.path().join("chat_matches.csv");

        let written = AlternatePathWriter::default()
            .write(&preferred, b"a,b\n", stamp())
            .unwrap();

        assert_eq!(written, preferred);
    }

    #[test]
    fn test_alternate_writer_falls_back_on_lock() {
        let preferred = PathBuf::from("/data/chat_matches.csv");
        let written = AlternatePathWriter::default()
            .write_with(&preferred, stamp(), |path| {
                if path == preferred {
                    Err(io::Error::from(io::ErrorKind::PermissionDenied))
                } else {
                    Ok(())
                }
            })
            .unwrap();

        assert_eq!(written, PathBuf::from("/data/chat_matches_20250302_090507.csv"));
    }

    #[test]
    fn test_alternate_writer_gives_up_after_budget() {
        let mut tried = Vec::new();
        let result = AlternatePathWriter::new(2).write_with(
            Path::new("/data/out.csv"),
            stamp(),
            |path| {
                tried.push(path.to_path_buf());
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            },
        );

        assert!(result.is_err());
        assert_eq!(
            tried,
            [
                PathBuf::from("/data/out.csv"),
                PathBuf::from("/data/out_20250302_090507.csv"),
                PathBuf::from("/data/out_20250302_090507_2.csv"),
            ]
        );
    }

    #[test]
    fn test_alternate_writer_fails_fast_on_other_errors() {
        let mut calls = 0;
        let result = AlternatePathWriter::default().write_with(
            Path::new("/data/out.csv"),
            stamp(),
            |_| {
                calls += 1;
                Err(io::Error::from(io::ErrorKind::NotFound))
            },
        );

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
