use super::{DateWindow, LifelogSource, backfill_windows, sync_window};
use crate::document::save_atomic;
use crate::instance::{SingleInstanceGuard, dir_lock_path};
use crate::resilience::{RetryPolicy, Shutdown};
use crate::watermark::{CounterFile, DATE_FORMAT, WatermarkSource};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pause between backfill windows.
const BACKFILL_PAUSE: Duration = Duration::from_secs(1);

/// What one sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The API returned nothing for the window.
    Empty(DateWindow),
    /// Data was written to `path`.
    Saved {
        /// Window fetched.
        window: DateWindow,
        /// Primary file.
        path: PathBuf,
    },
}

/// Fetches lifelog windows and persists them.
pub struct LifelogSync<S: LifelogSource> {
    source: S,
    save_dir: PathBuf,
    backup_dir: Option<PathBuf>,
    watermark: CounterFile,
    retry: RetryPolicy,
    shutdown: Shutdown,
    pause: Duration,
}

impl<S: LifelogSource> LifelogSync<S> {
    /// Creates a sync writing into `save_dir`, with `.last_sync` kept there.
    pub fn new(source: S, save_dir: impl Into<PathBuf>, retry: RetryPolicy, shutdown: Shutdown) -> Self {
        let save_dir = save_dir.into();
        Self {
            source,
            watermark: CounterFile::in_dir(&save_dir),
            save_dir,
            backup_dir: None,
            retry,
            shutdown,
            pause: BACKFILL_PAUSE,
        }
    }

    /// Also copies each file into `dir`.
    #[must_use]
    pub fn with_backup_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.backup_dir = dir;
        self
    }

    /// Overrides the pause between backfill windows.
    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// The watermark file.
    #[must_use]
    pub const fn watermark(&self) -> &CounterFile {
        &self.watermark
    }

    /// Syncs from the stored watermark through today.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceLocked`] if another sync holds the save
    /// directory, fetch errors after retries, or an error when the primary save
    /// fails. The watermark is untouched in all cases.
    #[tracing::instrument(skip(self), fields(save_dir = %self.save_dir.display()))]
    pub fn run(&self, now: NaiveDateTime) -> Result<SyncOutcome> {
        let _guard = self.lock()?;
        let today = now.date();
        let last = self.watermark.read();
        let window = sync_window(last, today);
        tracing::info!(
            last_sync = ?last,
            start = %window.start,
            end = %window.end,
            "Syncing lifelogs"
        );
        self.sync(window, today, now)
    }

    /// Fetches `from` through today in weekly windows.
    ///
    /// Returns the outcome of each window in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failed window. Windows already saved stay saved and
    /// the watermark reflects them. Fails with [`Error::InstanceLocked`] before
    /// any fetch if another sync holds the save directory.
    #[tracing::instrument(skip(self), fields(save_dir = %self.save_dir.display()))]
    pub fn backfill(&self, from: NaiveDate, now: NaiveDateTime) -> Result<Vec<SyncOutcome>> {
        let _guard = self.lock()?;
        let windows = backfill_windows(from, now.date());
        tracing::info!(windows = windows.len(), %from, "Starting backfill");

        let mut outcomes = Vec::with_capacity(windows.len());
        for (i, window) in windows.into_iter().enumerate() {
            if i > 0 && !self.shutdown.sleep(self.pause) {
                return Err(Error::Cancelled);
            }
            outcomes.push(self.sync(window, window.end, now)?);
        }

        tracing::info!(
            saved = outcomes
                .iter()
                .filter(|o| matches!(o, SyncOutcome::Saved { .. }))
                .count(),
            "Backfill complete"
        );
        Ok(outcomes)
    }

    fn lock(&self) -> Result<SingleInstanceGuard> {
        SingleInstanceGuard::acquire(dir_lock_path(&self.save_dir))
    }

    fn sync(&self, window: DateWindow, label: NaiveDate, now: NaiveDateTime) -> Result<SyncOutcome> {
        let data = self
            .retry
            .run("fetch_lifelogs", &self.shutdown, |_| self.source.fetch(window))?;

        if is_empty(&data) {
            tracing::warn!(start = %window.start, end = %window.end, "No lifelog data to save");
            return Ok(SyncOutcome::Empty(window));
        }

        let contents =
            serde_json::to_vec_pretty(&data).map_err(|e| Error::failed("encode_lifelogs", e))?;
        let name = file_name(label, now);

        std::fs::create_dir_all(&self.save_dir).map_err(|e| {
            Error::Precondition(format!(
                "cannot create lifelog directory {}: {e}",
                self.save_dir.display()
            ))
        })?;
        let path = self.save_dir.join(&name);
        save_atomic(&path, &contents)?;
        tracing::info!(path = %path.display(), bytes = contents.len(), "Lifelogs saved");

        if self.watermark.advance(label)? {
            tracing::debug!(mark = %label, "Lifelog watermark advanced");
        }

        if let Some(dir) = &self.backup_dir {
            if let Err(e) = save_backup(dir, &name, &contents) {
                tracing::warn!(dir = %dir.display(), error = %e, "Backup copy failed");
            }
        }

        Ok(SyncOutcome::Saved { window, path })
    }
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// `lifelogs_{date}_{YYYYmmdd_HHMMSS}.json`
fn file_name(date: NaiveDate, now: NaiveDateTime) -> String {
    format!(
        "lifelogs_{}_{}.json",
        date.format(DATE_FORMAT),
        now.format("%Y%m%d_%H%M%S")
    )
}

fn save_backup(dir: &Path, name: &str, contents: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::failed("create_backup_dir", e))?;
    save_atomic(dir.join(name), contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct Scripted {
        responses: RefCell<VecDeque<Result<Value>>>,
        windows: RefCell<Vec<DateWindow>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Value>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                windows: RefCell::new(Vec::new()),
            }
        }
    }

    impl LifelogSource for Scripted {
        fn fetch(&self, window: DateWindow) -> Result<Value> {
            self.windows.borrow_mut().push(window);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn now() -> NaiveDateTime {
        date("2025-03-10").and_hms_opt(6, 30, 0).unwrap()
    }

    fn sync<'a>(source: &'a Scripted, dir: &Path) -> LifelogSync<&'a Scripted> {
        LifelogSync::new(source, dir, RetryPolicy::immediate(2), Shutdown::new())
            .with_pause(Duration::ZERO)
    }

    #[test]
    fn test_run_saves_and_advances_watermark() {
        let dir = TempDir::new().unwrap();
        let source = Scripted::new(vec![Ok(json!({"data": {"lifelogs": [{"id": "a"}]}}))]);
        let sync = sync(&source, dir.path());

        let outcome = sync.run(now()).unwrap();

        let SyncOutcome::Saved { window, path } = outcome else {
            panic!("expected a saved outcome");
        };
        assert_eq!(window.start, date("2025-03-09"));
        assert_eq!(
            path.file_name().unwrap(),
            "lifelogs_2025-03-10_20250310_063000.json"
        );
        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["data"]["lifelogs"][0]["id"], "a");
        assert_eq!(sync.watermark().read(), Some(date("2025-03-10")));
    }

    #[test]
    fn test_rate_limited_fetch_waits_and_retries() {
        let dir = TempDir::new().unwrap();
        let source = Scripted::new(vec![
            Err(Error::RateLimited {
                operation: "fetch_lifelogs".to_string(),
                retry_after: Duration::ZERO,
            }),
            Ok(json!([{"id": "a"}])),
        ]);
        let sync = sync(&source, dir.path());

        let outcome = sync.run(now()).unwrap();

        assert!(matches!(outcome, SyncOutcome::Saved { .. }));
        assert_eq!(source.windows.borrow().len(), 2);
        assert_eq!(sync.watermark().read(), Some(date("2025-03-10")));
    }

    #[test]
    fn test_concurrent_sync_is_refused() {
        let dir = TempDir::new().unwrap();
        let _held = SingleInstanceGuard::acquire(dir_lock_path(dir.path())).unwrap();
        let source = Scripted::new(vec![Ok(json!([{"id": "a"}]))]);
        let sync = sync(&source, dir.path());

        let err = sync.run(now()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let err = sync.backfill(date("2025-03-01"), now()).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        assert!(source.windows.borrow().is_empty());
        assert_eq!(sync.watermark().read(), None);
    }

    #[test]
    fn test_run_uses_stored_watermark() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".last_sync"), "2025-03-05\n").unwrap();
        let source = Scripted::new(vec![Ok(json!([1]))]);

        sync(&source, dir.path()).run(now()).unwrap();

        assert_eq!(source.windows.borrow()[0].start, date("2025-03-05"));
    }

    #[test]
    fn test_empty_response_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let source = Scripted::new(vec![Ok(json!([]))]);
        let sync = sync(&source, dir.path());

        assert!(matches!(sync.run(now()).unwrap(), SyncOutcome::Empty(_)));
        let saved = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry.as_ref().unwrap().path().extension().is_some_and(|ext| ext == "json")
            })
            .count();
        assert_eq!(saved, 0);
        assert_eq!(sync.watermark().read(), None);
    }

    #[test]
    fn test_fetch_failure_keeps_watermark() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".last_sync"), "2025-03-05").unwrap();
        let source = Scripted::new(vec![Err(Error::failed("fetch_lifelogs", "401"))]);
        let sync = sync(&source, dir.path());

        assert!(sync.run(now()).is_err());
        assert_eq!(sync.watermark().read(), Some(date("2025-03-05")));
    }

    #[test]
    fn test_backup_copy_is_written() {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("backup");
        let source = Scripted::new(vec![Ok(json!({"x": 1}))]);
        let sync = sync(&source, &dir.path().join("primary")).with_backup_dir(Some(backup.clone()));

        sync.run(now()).unwrap();

        assert!(backup.join("lifelogs_2025-03-10_20250310_063000.json").exists());
    }

    #[test]
    fn test_backfill_walks_weekly_windows() {
        let dir = TempDir::new().unwrap();
        let source = Scripted::new(vec![Ok(json!([1])), Ok(json!([])), Ok(json!([3]))]);
        let sync = sync(&source, dir.path());

        let outcomes = sync.backfill(date("2025-02-20"), now()).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[1], SyncOutcome::Empty(_)));
        let starts: Vec<NaiveDate> = source.windows.borrow().iter().map(|w| w.start).collect();
        assert_eq!(starts, [date("2025-02-20"), date("2025-02-28"), date("2025-03-08")]);
        assert!(dir.path().join("lifelogs_2025-02-27_20250310_063000.json").exists());
        assert!(dir.path().join("lifelogs_2025-03-10_20250310_063000.json").exists());
        assert_eq!(sync.watermark().read(), Some(date("2025-03-10")));
    }
}
