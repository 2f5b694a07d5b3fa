//! Daily journal command.

use daybook::config::DaybookConfig;
use daybook::journal::JournalService;
use daybook::lifelog::{LifelogClient, LifelogSource, LifelogSync};
use daybook::llm::OllamaClient;
use daybook::{RetryPolicy, Shutdown};

/// Journal command.
pub fn cmd_journal(config: &DaybookConfig, shutdown: &Shutdown) -> anyhow::Result<()> {
    let retry = RetryPolicy::from_config(&config.retry).with_env_overrides();
    let features = config.journal.features;

    let llm = features
        .needs_llm()
        .then(|| OllamaClient::from_config(&config.llm));

    let lifelog = if features.lifelog_sync {
        match LifelogClient::from_config(&config.lifelog) {
            Ok(client) => {
                let source: Box<dyn LifelogSource> = Box::new(client);
                Some(
                    LifelogSync::new(source, &config.lifelog.save_dir, retry.clone(), shutdown.clone())
                        .with_backup_dir(config.lifelog.backup_dir.clone()),
                )
            },
            Err(e) => {
                tracing::warn!(error = %e, "Lifelog sync enabled but not configured, skipping");
                None
            },
        }
    } else {
        None
    };

    let mut service = JournalService::new(config.journal.clone(), retry, shutdown.clone());
    if let Some(llm) = &llm {
        service = service.with_llm(llm);
    }
    if let Some(sync) = lifelog {
        service = service.with_lifelog(sync);
    }

    let report = service.run(super::local_now())?;

    println!("Journal: {}", report.path.display());
    if report.created {
        println!("  Created from template");
    }
    match &report.previous {
        Some(gap) => println!("  Last entry: {} ({} days ago)", gap.last, gap.days),
        None => println!("  No previous entry"),
    }
    if report.reference_added {
        println!("  Added previous-entry reference");
    }
    println!("  Tasks carried: {}", report.carried.len());
    for task in &report.carried {
        println!("    {}", task.trim());
    }
    for title in &report.summaries {
        println!("  Updated: {title}");
    }
    if !report.saved {
        println!("  No changes");
    }
    if let Some(commit) = &report.commit {
        println!("  Committed: {commit}");
    }

    Ok(())
}
