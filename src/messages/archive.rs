//! The `result.json` message archive and its merge rules.

use super::models::Message;
use crate::document::save_atomic;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// On-disk archive layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveFile {
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_kind() -> String {
    "saved_messages".to_string()
}

impl Default for ArchiveFile {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            id: 0,
            messages: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Messages appended.
    pub added: usize,
    /// Messages whose id was already archived.
    pub skipped_known: usize,
    /// Messages older than the archive watermark.
    pub skipped_stale: usize,
}

/// A saved-message archive loaded in memory.
#[derive(Debug, Clone)]
pub struct MessageArchive {
    path: PathBuf,
    data: ArchiveFile,
}

impl MessageArchive {
    /// Loads the archive at `path`.
    ///
    /// A missing file yields an empty archive that is created on first save.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the file exists but is not a valid
    /// archive; it is never overwritten in that case.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Archive not found, starting a new one");
                return Ok(Self {
                    path,
                    data: ArchiveFile::default(),
                });
            },
            Err(e) => {
                return Err(Error::failed(
                    "read_archive",
                    format!("{}: {e}", path.display()),
                ));
            },
        };

        let data: ArchiveFile = serde_json::from_str(&raw).map_err(|e| {
            Error::Precondition(format!(
                "archive {} is not valid JSON ({e}); fix or move it before syncing",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), messages = data.messages.len(), "Loaded archive");
        Ok(Self { path, data })
    }

    /// Archive file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archived messages in file order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.data.messages
    }

    /// Number of archived messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.messages.len()
    }

    /// Whether the archive holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.messages.is_empty()
    }

    /// Archive owner id.
    #[must_use]
    pub const fn owner_id(&self) -> i64 {
        self.data.id
    }

    /// Most recent message timestamp.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDateTime> {
        self.data.messages.iter().filter_map(Message::timestamp).max()
    }

    /// Ids already archived.
    #[must_use]
    pub fn known_ids(&self) -> HashSet<i64> {
        self.data.messages.iter().map(|m| m.id).collect()
    }

    /// Appends new messages in ascending order.
    ///
    /// Known ids are skipped, as are messages strictly older than the latest
    /// archived timestamp. Equal timestamps are decided by id alone.
    pub fn merge(&mut self, mut incoming: Vec<Message>) -> MergeReport {
        let latest = self.latest_date();
        let mut known = self.known_ids();
        let mut report = MergeReport::default();

        incoming.sort_by_key(Message::sort_key);
        for message in incoming {
            if known.contains(&message.id) {
                report.skipped_known += 1;
                continue;
            }
            if let Some(latest) = latest {
                match message.timestamp() {
                    Some(ts) if ts >= latest => {},
                    _ => {
                        tracing::debug!(id = message.id, date = %message.date, "Skipping stale message");
                        report.skipped_stale += 1;
                        continue;
                    },
                }
            }
            known.insert(message.id);
            self.data.messages.push(message);
            report.added += 1;
        }

        if report.added > 0 {
            self.refresh_owner_id();
        }
        report
    }

    /// Copies the archive to `{file}.backup_{YYYYmmdd_HHMMSS}`.
    ///
    /// Returns `None` when there is no file yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    pub fn backup(&self, now: NaiveDateTime) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "No archive to back up");
            return Ok(None);
        }
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".backup_{}", now.format("%Y%m%d_%H%M%S")));
        let backup = PathBuf::from(name);
        std::fs::copy(&self.path, &backup)
            .map_err(|e| Error::failed("backup_archive", format!("{}: {e}", backup.display())))?;
        tracing::info!(backup = %backup.display(), "Created archive backup");
        Ok(Some(backup))
    }

    /// Writes the archive atomically with one-space indentation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.data
            .serialize(&mut serializer)
            .map_err(|e| Error::failed("serialize_archive", e))?;
        save_atomic(&self.path, &buf)?;
        tracing::info!(path = %self.path.display(), messages = self.len(), "Saved archive");
        Ok(())
    }

    fn refresh_owner_id(&mut self) {
        let owner = self
            .data
            .messages
            .first()
            .and_then(|m| m.from_id.as_deref())
            .and_then(|from_id| from_id.trim_start_matches("user").parse::<i64>().ok());
        if let Some(owner) = owner {
            self.data.id = owner;
        }
    }
}
