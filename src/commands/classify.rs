//! Pattern classification command.

use clap::Args;
use daybook::classify::{ClassifierService, ClassifyOptions, ResumeMode};
use daybook::config::DaybookConfig;
use daybook::llm::OllamaClient;
use daybook::{RetryPolicy, Shutdown};
use std::path::PathBuf;

/// Flags for `daybook classify`.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Message archive to classify (default: the messages archive).
    #[arg(long = "json")]
    pub archive: Option<PathBuf>,

    /// Pattern definition file.
    #[arg(long)]
    pub patterns: Option<PathBuf>,

    /// Most recent messages to classify; 0 or less means all.
    #[arg(long, allow_negative_numbers = true)]
    pub max: Option<i64>,

    /// Reuse verdicts from an existing report.
    #[arg(long = "continue", conflicts_with = "reanalyze")]
    pub resume: bool,

    /// Ignore any existing report.
    #[arg(long)]
    pub reanalyze: bool,

    /// Messages of context before each message.
    #[arg(long)]
    pub context_before: Option<usize>,

    /// Messages of context after each message.
    #[arg(long)]
    pub context_after: Option<usize>,

    /// Directory for the report (default: next to the archive).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ClassifyArgs {
    fn options(self, config: &DaybookConfig) -> ClassifyOptions {
        let archive = self
            .archive
            .unwrap_or_else(|| config.messages.archive_path.clone());
        let mut options = ClassifyOptions::from_config(&config.classify, archive);
        if let Some(patterns) = self.patterns {
            options.patterns_path = patterns;
        }
        if let Some(max) = self.max {
            options.max_messages = max;
        }
        if let Some(before) = self.context_before {
            options.window.before = before;
        }
        if let Some(after) = self.context_after {
            options.window.after = after;
        }
        if self.output.is_some() {
            options.output_dir = self.output;
        }
        options.resume = if self.resume {
            ResumeMode::Continue
        } else if self.reanalyze {
            ResumeMode::Reanalyze
        } else {
            ResumeMode::Fresh
        };
        options
    }
}

/// Classify command.
pub fn cmd_classify(
    config: &DaybookConfig,
    args: ClassifyArgs,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    let options = args.options(config);
    let llm = OllamaClient::from_config(&config.llm);
    let retry = RetryPolicy::from_config(&config.retry).with_env_overrides();
    let service = ClassifierService::new(&llm, retry, shutdown.clone());

    let report = service.run(&options, super::local_now())?;

    println!("Analyzed: {}", report.analyzed);
    if report.reused > 0 {
        println!("  Reused from previous report: {}", report.reused);
    }
    if report.skipped_empty > 0 {
        println!("  Skipped (no text): {}", report.skipped_empty);
    }
    if report.failed > 0 {
        println!("  Failed model calls: {}", report.failed);
    }
    println!("  Matches: {}", report.matches);
    match &report.output {
        Some(path) => println!("Report: {}", path.display()),
        None => println!("No matches, no report written"),
    }

    Ok(())
}
