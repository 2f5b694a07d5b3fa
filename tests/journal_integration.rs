//! Integration tests for the daily journal run.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{NaiveDate, NaiveDateTime};
use daybook::config::{JournalConfig, JournalFeatures};
use daybook::instance::dir_lock_path;
use daybook::journal::JournalService;
use daybook::lifelog::{DateWindow, LifelogSource, LifelogSync, SyncOutcome};
use daybook::{Error, LlmProvider, Result, RetryPolicy, Shutdown, SingleInstanceGuard};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const TEMPLATE: &str = "# Daily\n\n## Life\n\n## Due in the next two weeks - Anticipation\n";

fn setup(features: JournalFeatures) -> (TempDir, JournalConfig) {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("Daily");
    std::fs::create_dir_all(&journal).unwrap();
    let template = dir.path().join("Daily Template.md");
    std::fs::write(&template, TEMPLATE).unwrap();
    let config = JournalConfig {
        dir: journal,
        template,
        features,
        ..JournalConfig::default()
    };
    (dir, config)
}

fn at(day: &str, hour: u32) -> NaiveDateTime {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_tasks_follow_across_days_and_gaps() {
    let (_dir, config) = setup(JournalFeatures::none());
    std::fs::write(
        config.dir.join("2025-03-03.md"),
        "# Daily\n\n## Life\n\n## Due in the next two weeks - Anticipation\n\n- [ ] Buy milk\n- [ ] Call Bob\n",
    )
    .unwrap();
    let service = JournalService::new(config.clone(), RetryPolicy::immediate(1), Shutdown::new());

    let tuesday = service.run(at("2025-03-04", 7)).unwrap();
    assert!(tuesday.created);
    assert_eq!(tuesday.carried, ["- [ ] Buy milk", "- [ ] Call Bob"]);
    let text = read(&tuesday.path);
    assert!(text.contains("## Life\n\n Yesterday's note: [[2025-03-03]]\n"));
    assert!(!text.contains("<!-- Tasks carried over"));

    let ticked = read(&tuesday.path).replace("- [ ] Call Bob", "- [x] Call Bob");
    std::fs::write(&tuesday.path, ticked).unwrap();

    let friday = service.run(at("2025-03-07", 7)).unwrap();
    assert_eq!(friday.previous.unwrap().days, 3);
    assert_eq!(friday.carried, ["- [ ] Buy milk"]);
    let text = read(&friday.path);
    assert!(text.contains(" The last journal entry was [[2025-03-04]], which was 3 days ago"));
    assert!(text.contains("<!-- Tasks carried over from 2025-03-04, 3 days ago -->\n- [ ] Buy milk\n"));
    assert!(!text.contains("Call Bob"));
    assert_eq!(text.matches("Last modified").count(), 1);
}

#[test]
fn test_unpadded_note_names_are_not_mistaken_for_yesterday() {
    let (_dir, config) = setup(JournalFeatures::none());
    std::fs::write(
        config.dir.join("2025-02-27.md"),
        "## Due in the next two weeks - Anticipation\n- [ ] Call Bob\n",
    )
    .unwrap();
    std::fs::write(config.dir.join("2025-3-1.md"), "scratch\n").unwrap();
    let service = JournalService::new(config.clone(), RetryPolicy::immediate(1), Shutdown::new());

    let report = service.run(at("2025-03-02", 7)).unwrap();

    let previous = report.previous.unwrap();
    assert_eq!(previous.last, NaiveDate::from_ymd_opt(2025, 2, 27).unwrap());
    assert_eq!(previous.days, 3);
    assert_eq!(report.carried, ["- [ ] Call Bob"]);
    assert_eq!(read(&config.dir.join("2025-3-1.md")), "scratch\n");
}

#[test]
fn test_second_run_is_refused_while_first_holds_the_journal() {
    let (_dir, config) = setup(JournalFeatures::none());
    let held = SingleInstanceGuard::acquire(dir_lock_path(&config.dir)).unwrap();
    let service = JournalService::new(config.clone(), RetryPolicy::immediate(1), Shutdown::new());

    let err = service.run(at("2025-03-04", 7)).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(!config.dir.join("2025-03-04.md").exists());

    drop(held);
    assert!(service.run(at("2025-03-04", 7)).unwrap().created);
}

#[test]
fn test_rerun_later_only_moves_trailer() {
    let (_dir, config) = setup(JournalFeatures::none());
    std::fs::write(
        config.dir.join("2025-03-03.md"),
        "## Due in the next two weeks - Anticipation\n- [ ] Renew passport\n",
    )
    .unwrap();
    let service = JournalService::new(config, RetryPolicy::immediate(1), Shutdown::new());

    let morning = service.run(at("2025-03-04", 7)).unwrap();
    let before = read(&morning.path);
    let evening = service.run(at("2025-03-04", 21)).unwrap();
    let after = read(&evening.path);

    assert!(evening.saved);
    assert!(evening.carried.is_empty());
    assert!(!evening.reference_added);
    assert_eq!(
        before.replace("2025-03-04 07:00:00", "2025-03-04 21:00:00"),
        after
    );
}

#[test]
fn test_user_edits_survive_the_run() {
    let (_dir, config) = setup(JournalFeatures::none());
    std::fs::write(config.dir.join("2025-03-03.md"), "## Life\nquiet day\n").unwrap();
    let today = config.dir.join("2025-03-04.md");
    std::fs::write(
        &today,
        "# Daily\n\n## Life\n\nRan 5k.\n\n## Work\n\n- shipped the release\n",
    )
    .unwrap();
    let service = JournalService::new(config, RetryPolicy::immediate(1), Shutdown::new());

    let report = service.run(at("2025-03-04", 7)).unwrap();

    assert!(!report.created);
    let text = read(&today);
    assert!(text.starts_with(
        "# Daily\n\n## Life\n\n Yesterday's note: [[2025-03-03]]\n\nRan 5k.\n\n## Work\n\n- shipped the release\n"
    ));
    assert!(text.contains("## Due in the next two weeks - Anticipation\n"));
}

struct Unreachable;

impl LlmProvider for Unreachable {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::failed("ollama_generate", "connection refused"))
    }
}

#[test]
fn test_summary_failure_does_not_fail_the_run() {
    let features = JournalFeatures {
        summary_7: true,
        ..JournalFeatures::none()
    };
    let (_dir, config) = setup(features);
    std::fs::write(config.dir.join("2025-03-03.md"), "## Life\nyesterday\n").unwrap();
    let llm = Unreachable;
    let service =
        JournalService::new(config, RetryPolicy::immediate(2), Shutdown::new()).with_llm(&llm);

    let report = service.run(at("2025-03-04", 7)).unwrap();

    assert!(report.summaries.is_empty());
    assert!(report.saved);
    assert!(!read(&report.path).contains("7-Day Summary"));
}

struct FixedLifelogs(Value);

impl LifelogSource for FixedLifelogs {
    fn fetch(&self, _window: DateWindow) -> Result<Value> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_lifelog_sync_runs_after_the_note() {
    let features = JournalFeatures {
        lifelog_sync: true,
        ..JournalFeatures::none()
    };
    let (dir, config) = setup(features);
    let save_dir = dir.path().join("lifelogs");
    let source: Box<dyn LifelogSource> =
        Box::new(FixedLifelogs(json!({"data": {"lifelogs": [{"id": "x"}]}})));
    let sync = LifelogSync::new(source, &save_dir, RetryPolicy::immediate(1), Shutdown::new())
        .with_pause(Duration::ZERO);
    let service = JournalService::new(config, RetryPolicy::immediate(1), Shutdown::new())
        .with_lifelog(sync);

    let report = service.run(at("2025-03-04", 7)).unwrap();

    let Some(SyncOutcome::Saved { path, .. }) = report.lifelog else {
        panic!("expected lifelogs to be saved");
    };
    assert_eq!(path.parent().unwrap(), save_dir);
    assert_eq!(read(&save_dir.join(".last_sync")).trim(), "2025-03-04");
}

#[test]
fn test_missing_journal_dir_touches_nothing() {
    let (dir, mut config) = setup(JournalFeatures::all());
    config.dir = dir.path().join("nowhere");
    let service = JournalService::new(config.clone(), RetryPolicy::immediate(1), Shutdown::new());

    let err = service.run(at("2025-03-04", 7)).unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(!config.dir.exists());
}
