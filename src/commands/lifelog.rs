//! Lifelog sync command.

use chrono::NaiveDate;
use daybook::config::DaybookConfig;
use daybook::lifelog::{LifelogClient, LifelogSync, SyncOutcome};
use daybook::{RetryPolicy, Shutdown};

/// Lifelog command.
pub fn cmd_lifelog(
    config: &DaybookConfig,
    backfill_from: Option<NaiveDate>,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    let client = LifelogClient::from_config(&config.lifelog)?;
    let retry = RetryPolicy::from_config(&config.retry).with_env_overrides();
    let sync = LifelogSync::new(client, &config.lifelog.save_dir, retry, shutdown.clone())
        .with_backup_dir(config.lifelog.backup_dir.clone());
    let now = super::local_now();

    let outcomes = match backfill_from {
        Some(from) if from > now.date() => {
            anyhow::bail!(daybook::Error::InvalidInput(format!(
                "--backfill-from {from} is in the future"
            )));
        },
        Some(from) => sync.backfill(from, now)?,
        None => vec![sync.run(now)?],
    };

    for outcome in &outcomes {
        match outcome {
            SyncOutcome::Saved { window, path } => {
                println!("{} to {}: saved {}", window.start, window.end, path.display());
            },
            SyncOutcome::Empty(window) => {
                println!("{} to {}: no data", window.start, window.end);
            },
        }
    }

    Ok(())
}
