//! Saved-message sync command.

use anyhow::Context;
use clap::Args;
use daybook::config::{DaybookConfig, MessagesConfig};
use daybook::messages::{self, FetchSettings, HttpMessageSource, MessageArchive, MessageSync};
use daybook::{PollSchedule, RetryPolicy, Shutdown, SingleInstanceGuard};
use std::path::PathBuf;
use std::time::Duration;

/// Flags for `daybook messages`.
#[derive(Debug, Args)]
pub struct MessagesArgs {
    /// Keep polling for new messages until interrupted.
    #[arg(short, long)]
    pub monitor: bool,

    /// Copy the archive aside before syncing.
    #[arg(short, long)]
    pub backup: bool,

    /// Archive file to update.
    #[arg(long)]
    pub json_file: Option<PathBuf>,

    /// Messages requested per page.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to wait between pages.
    #[arg(long)]
    pub batch_delay: Option<f64>,

    /// Seconds between polls in monitor mode (minimum 300).
    #[arg(long)]
    pub polling_interval: Option<u64>,
}

impl MessagesArgs {
    fn apply(&self, config: &mut MessagesConfig) -> anyhow::Result<()> {
        if let Some(path) = &self.json_file {
            config.archive_path.clone_from(path);
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(delay) = self.batch_delay {
            config.batch_delay = Duration::try_from_secs_f64(delay)
                .with_context(|| format!("invalid --batch-delay {delay}"))?;
        }
        if let Some(interval) = self.polling_interval {
            config.polling_interval = Duration::from_secs(interval);
        }
        Ok(())
    }
}

/// Messages command.
pub fn cmd_messages(
    config: &DaybookConfig,
    args: MessagesArgs,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    let mut settings = config.messages.clone();
    args.apply(&mut settings)?;

    let _guard = SingleInstanceGuard::acquire(messages::lock_path(
        &settings.data_dir,
        &settings.session,
    ))?;

    let source = HttpMessageSource::from_config(&settings)?;
    let mut archive = MessageArchive::load(&settings.archive_path)?;
    if args.backup {
        if let Some(path) = archive.backup(super::local_now())? {
            println!("Backup: {}", path.display());
        }
    }

    let retry = RetryPolicy::from_config(&config.retry).with_env_overrides();
    let sync = MessageSync::new(
        &source,
        FetchSettings::from_config(&settings),
        retry,
        shutdown.clone(),
    );

    if args.monitor {
        let mut schedule = PollSchedule::new(settings.polling_interval);
        println!(
            "Monitoring {} every {}s (Ctrl+C to stop)",
            archive.path().display(),
            schedule.current().as_secs()
        );
        sync.monitor(&mut archive, &mut schedule)?;
        println!("Stopped. Archive holds {} messages", archive.len());
        return Ok(());
    }

    let report = sync.run_once(&mut archive)?;
    println!("Archive: {}", archive.path().display());
    println!("  Added: {}", report.merge.added);
    println!("  Already archived: {}", report.merge.skipped_known);
    if report.merge.skipped_stale > 0 {
        println!("  Skipped as older: {}", report.merge.skipped_stale);
    }
    if report.rate_limit_waits > 0 {
        println!("  Rate-limit pauses: {}", report.rate_limit_waits);
    }
    println!("  Total: {}", archive.len());

    Ok(())
}
