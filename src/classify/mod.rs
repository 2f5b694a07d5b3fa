//! Pattern classification of archived messages.
//!
//! Each message is sent to the local model together with the pattern
//! definitions and a fixed window of neighbouring messages. Matches are written
//! to a CSV report next to the archive; with resume enabled, verdicts already
//! in that report are reused instead of asking the model again.

mod context;
mod report;
mod verdict;

pub use context::{ContextWindow, message_text};
pub use report::{CONTEXT_LIMIT, ReportRow, load_previous, report_path, write_report};
pub use verdict::{NO, Verdict, normalize};

use crate::config::ClassifyConfig;
use crate::document::AlternatePathWriter;
use crate::llm::{LlmProvider, complete_with_retry};
use crate::messages::{Message, MessageArchive};
use crate::resilience::{RetryPolicy, Shutdown};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pause between model calls.
const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// How earlier results are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResumeMode {
    /// Classify every selected message.
    #[default]
    Fresh,
    /// Reuse verdicts from the existing report by message id.
    Continue,
    /// Ignore the existing report even if present.
    Reanalyze,
}

/// Inputs for one classification run.
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Message archive.
    pub archive_path: PathBuf,
    /// Pattern definitions.
    pub patterns_path: PathBuf,
    /// Report directory; the archive's directory when unset.
    pub output_dir: Option<PathBuf>,
    /// Most recent messages to classify; zero or less means all.
    pub max_messages: i64,
    /// Neighbours included in each prompt.
    pub window: ContextWindow,
    /// Treatment of earlier results.
    pub resume: ResumeMode,
}

impl ClassifyOptions {
    /// Options from configuration for `archive_path`.
    #[must_use]
    pub fn from_config(config: &ClassifyConfig, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            patterns_path: config.patterns_path.clone(),
            output_dir: config.output_dir.clone(),
            max_messages: config.max_messages,
            window: ContextWindow {
                before: config.context_before,
                after: config.context_after,
            },
            resume: ResumeMode::default(),
        }
    }

    /// Where the report goes.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        let dir = self.output_dir.clone().unwrap_or_else(|| {
            self.archive_path
                .parent()
                .map_or_else(PathBuf::new, Path::to_path_buf)
        });
        report_path(&dir, &self.archive_path)
    }
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Messages considered.
    pub analyzed: usize,
    /// Verdicts taken from the previous report.
    pub reused: usize,
    /// Messages classified as matches.
    pub matches: usize,
    /// Messages skipped for having no text.
    pub skipped_empty: usize,
    /// Model calls that failed after retries.
    pub failed: usize,
    /// Report written, if any matched.
    pub output: Option<PathBuf>,
}

/// Runs the classifier over an archive.
pub struct ClassifierService<'a> {
    llm: &'a dyn LlmProvider,
    retry: RetryPolicy,
    shutdown: Shutdown,
    writer: AlternatePathWriter,
    pacing: Duration,
}

impl<'a> ClassifierService<'a> {
    /// Creates a service backed by `llm`.
    #[must_use]
    pub fn new(llm: &'a dyn LlmProvider, retry: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            llm,
            retry,
            shutdown,
            writer: AlternatePathWriter::default(),
            pacing: DEFAULT_PACING,
        }
    }

    /// Overrides the pause between model calls.
    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Classifies the most recent messages and writes the match report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] when the archive or pattern file is
    /// missing or the model is unreachable, [`Error::Cancelled`] on shutdown,
    /// and write failures for the report. Individual model failures are
    /// logged and counted, not returned.
    #[tracing::instrument(skip_all, fields(archive = %options.archive_path.display()))]
    pub fn run(&self, options: &ClassifyOptions, now: NaiveDateTime) -> Result<ClassifyReport> {
        let (archive, patterns) = self.check_preconditions(options)?;

        let mut dated: Vec<(&Message, NaiveDateTime)> = archive
            .messages()
            .iter()
            .filter_map(|m| m.timestamp().map(|t| (m, t)))
            .collect();
        dated.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.id.cmp(&a.0.id)));
        if let Ok(max) = usize::try_from(options.max_messages) {
            if max > 0 {
                dated.truncate(max);
            }
        }
        tracing::info!(
            selected = dated.len(),
            total = archive.len(),
            before = options.window.before,
            after = options.window.after,
            "Classifying messages"
        );

        let report_path = options.report_path();
        let previous = match options.resume {
            ResumeMode::Continue => load_previous(&report_path),
            ResumeMode::Fresh | ResumeMode::Reanalyze => HashMap::new(),
        };

        let ordered: Vec<&Message> = dated.iter().map(|(m, _)| *m).collect();
        let mut report = ClassifyReport::default();
        let mut rows = Vec::new();
        let mut asked_model = false;

        for (index, (message, timestamp)) in dated.iter().enumerate() {
            self.shutdown.check()?;
            report.analyzed += 1;

            let text = message_text(message);
            if text.trim().is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            let context = options.window.render(&ordered, index);

            let verdict = if let Some(answer) = previous.get(&message.id) {
                report.reused += 1;
                tracing::debug!(message_id = message.id, answer = %answer, "Reusing previous verdict");
                Verdict::parse(answer)
            } else {
                if asked_model && !self.shutdown.sleep(self.pacing) {
                    return Err(Error::Cancelled);
                }
                asked_model = true;
                match self.classify(&patterns, &text, &context) {
                    Ok(verdict) => verdict,
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(message_id = message.id, error = %e, "Classification failed");
                        continue;
                    },
                }
            };

            metrics::counter!(
                "daybook_classifier_verdicts_total",
                "verdict" => if verdict.is_match() { "match" } else { "no" }
            )
            .increment(1);
            tracing::info!(
                message_id = message.id,
                at = %timestamp,
                verdict = verdict.answer(),
                "Classified message"
            );

            if let Some(row) = ReportRow::new(message, *timestamp, text, &context, &verdict) {
                rows.push(row);
            }
        }

        report.matches = rows.len();
        if rows.is_empty() {
            tracing::info!(analyzed = report.analyzed, "No matches, report not written");
        } else {
            let path = write_report(&report_path, rows, &self.writer, now)?;
            tracing::info!(path = %path.display(), matches = report.matches, "Report written");
            report.output = Some(path);
        }
        Ok(report)
    }

    fn check_preconditions(&self, options: &ClassifyOptions) -> Result<(MessageArchive, String)> {
        if !options.archive_path.is_file() {
            return Err(Error::Precondition(format!(
                "message archive not found: {}",
                options.archive_path.display()
            )));
        }
        let patterns = std::fs::read_to_string(&options.patterns_path).map_err(|e| {
            Error::Precondition(format!(
                "pattern file {} unreadable: {e}",
                options.patterns_path.display()
            ))
        })?;
        if !self.llm.is_available() {
            return Err(Error::Precondition(format!(
                "{} is not reachable; start it and pull the model first",
                self.llm.name()
            )));
        }
        let archive = MessageArchive::load(&options.archive_path)?;
        Ok((archive, patterns))
    }

    fn classify(&self, patterns: &str, text: &str, context: &str) -> Result<Verdict> {
        let prompt = build_prompt(patterns, text, context);
        let raw = complete_with_retry(self.llm, &self.retry, &self.shutdown, &prompt)?;
        tracing::debug!(raw = %raw, "Model answer");
        Ok(Verdict::from_completion(&raw))
    }
}

/// Prompt for one message.
#[must_use]
pub fn build_prompt(patterns: &str, text: &str, context: &str) -> String {
    let context_section = if context.is_empty() {
        String::new()
    } else {
        format!("\n### Surrounding Message Context:\n{context}\n")
    };

    format!(
        "### Pattern Definitions\n{patterns}\n{context_section}\n\
         ### Instructions:\n\
         Decide whether the message below matches one of the pattern definitions.\n\
         - If nothing matches, respond with only: \"No\"\n\
         - If a pattern matches, respond in its output format: [type, arg1, arg2]\n\n\
         Only the message to analyze counts; use the context messages to fill in arguments.\n\
         ### Message to analyze:\n\"{text}\"\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Scripted {
        available: bool,
        answers: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                available: true,
                answers: Mutex::new(answers.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl LlmProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("No".to_string()))
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn at(minute: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    struct Fixture {
        dir: TempDir,
        options: ClassifyOptions,
    }

    fn fixture(messages: &[(i64, &str)]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("result.json");
        let mut archive = MessageArchive::load(&archive_path).unwrap();
        archive.merge(
            messages
                .iter()
                .map(|&(id, text)| {
                    Message::new(id, at(u32::try_from(id).unwrap()), text).with_sender("Ada", "user1")
                })
                .collect(),
        );
        archive.save().unwrap();

        let patterns_path = dir.path().join("patterns.txt");
        std::fs::write(&patterns_path, "[Remind, what, when]\n").unwrap();

        let options = ClassifyOptions {
            archive_path,
            patterns_path,
            output_dir: None,
            max_messages: 0,
            window: ContextWindow { before: 1, after: 1 },
            resume: ResumeMode::Fresh,
        };
        Fixture { dir, options }
    }

    fn service(llm: &Scripted) -> ClassifierService<'_> {
        ClassifierService::new(llm, RetryPolicy::immediate(2), Shutdown::new())
            .with_pacing(Duration::ZERO)
    }

    #[test]
    fn test_missing_inputs_are_preconditions() {
        let fx = fixture(&[(1, "hi")]);
        let llm = Scripted::new(vec![]);

        let mut options = fx.options.clone();
        options.patterns_path = fx.dir.path().join("missing.txt");
        let err = service(&llm).run(&options, at(59)).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut options = fx.options.clone();
        options.archive_path = fx.dir.path().join("missing.json");
        assert_eq!(service(&llm).run(&options, at(59)).unwrap_err().exit_code(), 2);

        let offline = Scripted {
            available: false,
            ..Scripted::new(vec![])
        };
        assert_eq!(service(&offline).run(&fx.options, at(59)).unwrap_err().exit_code(), 2);
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_newest_first_with_limit_and_context() {
        let fx = fixture(&[(1, "oldest"), (2, "middle"), (3, "p buy milk"), (4, "newest")]);
        let llm = Scripted::new(vec![
            Ok("No".to_string()),
            Ok("Output format - [Remind, buy milk, today]".to_string()),
        ]);
        let mut options = fx.options.clone();
        options.max_messages = 3;

        let report = service(&llm).run(&options, at(59)).unwrap();

        assert_eq!(report.analyzed, 3);
        assert_eq!(report.matches, 1);
        assert_eq!(llm.calls(), 3);
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"newest\""));
        assert!(prompts[1].contains("[BEFORE - 2025-03-01 10:04:00 - Ada]: newest"));
        assert!(prompts[1].contains("[AFTER - 2025-03-01 10:02:00 - Ada]: middle"));
        assert!(!prompts.iter().any(|p| p.contains("\"oldest\"")));

        let path = report.output.unwrap();
        assert_eq!(path, fx.dir.path().join("result_matches.csv"));
        let csv = std::fs::read_to_string(path).unwrap();
        assert!(csv.contains("\"[Remind, buy milk, today]\",Remind,buy milk,today,3"));
    }

    #[test]
    fn test_continue_reuses_previous_verdicts() {
        let fx = fixture(&[(1, "p call mom"), (2, "p water plants")]);
        let llm = Scripted::new(vec![
            Ok("[Remind, water plants, tonight]".to_string()),
            Ok("[Remind, call mom, sunday]".to_string()),
        ]);
        service(&llm).run(&fx.options, at(59)).unwrap();
        assert_eq!(llm.calls(), 2);

        let mut options = fx.options.clone();
        options.resume = ResumeMode::Continue;
        let report = service(&llm).run(&options, at(59)).unwrap();
        assert_eq!(report.reused, 2);
        assert_eq!(report.matches, 2);
        assert_eq!(llm.calls(), 2);

        options.resume = ResumeMode::Reanalyze;
        let report = service(&llm).run(&options, at(59)).unwrap();
        assert_eq!(report.reused, 0);
        assert_eq!(llm.calls(), 4);
        assert_eq!(report.matches, 0);
        assert!(report.output.is_none());
    }

    #[test]
    fn test_failed_calls_are_counted_not_fatal() {
        let fx = fixture(&[(1, "p one"), (2, "p two")]);
        let llm = Scripted::new(vec![
            Err(Error::failed("llm_complete", "model not found")),
            Ok("[Remind, one, later]".to_string()),
        ]);

        let report = service(&llm).run(&fx.options, at(59)).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.matches, 1);
    }

    #[test]
    fn test_prompt_includes_context_only_when_present() {
        assert!(!build_prompt("defs", "hello", "").contains("Surrounding"));
        let prompt = build_prompt("defs", "hello", "[BEFORE - x - y]: z");
        assert!(prompt.contains("### Surrounding Message Context:\n[BEFORE - x - y]: z"));
        assert!(prompt.contains("\"hello\""));
    }
}
