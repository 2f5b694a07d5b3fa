//! Saved-message archive sync.
//!
//! The archive (`result.json`) is the artifact and its own watermark: the latest
//! message date bounds the request, and the set of archived ids is the dedup key.
//! [`DeltaFetcher`] pages newest-first through a [`MessageSource`] until it
//! reaches already-archived territory; [`MessageArchive::merge`] appends the
//! delta in ascending order.

mod archive;
mod fetcher;
mod models;
mod source;
mod sync;

pub use archive::{MergeReport, MessageArchive};
pub use fetcher::{DeltaFetcher, FetchOutcome, FetchSettings, StopReason};
pub use models::{MESSAGE_DATE_FORMAT, Message};
pub use source::{FetchRequest, HttpMessageSource, MessageSource};
pub use sync::{MessageSync, SyncReport};

use std::path::{Path, PathBuf};

/// Lock file guarding one session: `{data_dir}/{session}.lock`.
#[must_use]
pub fn lock_path(data_dir: &Path, session: &str) -> PathBuf {
    data_dir.join(format!("{session}.lock"))
}
