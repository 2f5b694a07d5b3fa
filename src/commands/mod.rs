//! Command handlers module.
//!
//! One file per flow:
//! - `journal.rs`: Daily note carryover
//! - `messages.rs`: Saved-message archive sync and monitor mode
//! - `lifelog.rs`: Lifelog window sync and backfill
//! - `classify.rs`: Pattern classification of archived messages

mod classify;
mod journal;
mod lifelog;
mod messages;

use chrono::NaiveDateTime;

// Re-export command functions
pub use classify::{ClassifyArgs, cmd_classify};
pub use journal::cmd_journal;
pub use lifelog::cmd_lifelog;
pub use messages::{MessagesArgs, cmd_messages};

/// Wall-clock time the flows run against.
fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
