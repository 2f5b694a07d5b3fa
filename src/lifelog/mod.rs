//! Lifelog sync.
//!
//! Pulls lifelog entries for the days since the last successful sync and saves
//! each response as a timestamped JSON file. The `.last_sync` watermark in the
//! save directory moves only after the primary save succeeds.

mod client;
mod sync;

pub use client::{LifelogClient, LifelogSource, PAGE_LIMIT};
pub use sync::{LifelogSync, SyncOutcome};

use chrono::{Days, NaiveDate};

/// Default lifelog API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.limitless.ai/v1/lifelogs";

/// Longest window a regular sync will request.
pub const MAX_WINDOW_DAYS: u64 = 30;

/// Window length used by backfill.
pub const BACKFILL_CHUNK_DAYS: u64 = 7;

/// Inclusive date range sent to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

/// Picks the window for a regular sync from the last synced date.
///
/// No watermark, or a watermark at or after today, requests yesterday through
/// today. Gaps longer than [`MAX_WINDOW_DAYS`] are clamped.
#[must_use]
pub fn sync_window(last: Option<NaiveDate>, today: NaiveDate) -> DateWindow {
    let yesterday = today - Days::new(1);
    let start = match last {
        None => yesterday,
        Some(last) if last >= today => yesterday,
        Some(last) if (today - last).num_days() > MAX_WINDOW_DAYS as i64 => {
            today - Days::new(MAX_WINDOW_DAYS)
        },
        Some(last) => last,
    };
    DateWindow { start, end: today }
}

/// Splits `from..=today` into consecutive backfill windows.
///
/// Each window spans up to [`BACKFILL_CHUNK_DAYS`] days past its start; the
/// next window begins the day after the previous one ends.
#[must_use]
pub fn backfill_windows(from: NaiveDate, today: NaiveDate) -> Vec<DateWindow> {
    let mut windows = Vec::new();
    let mut start = from;
    while start <= today {
        let end = (start + Days::new(BACKFILL_CHUNK_DAYS)).min(today);
        windows.push(DateWindow { start, end });
        start = end + Days::new(1);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test_case(None, "2025-03-09" ; "no watermark")]
    #[test_case(Some("2025-03-10"), "2025-03-09" ; "synced today")]
    #[test_case(Some("2025-03-12"), "2025-03-09" ; "watermark in the future")]
    #[test_case(Some("2025-03-04"), "2025-03-04" ; "short gap")]
    #[test_case(Some("2025-02-08"), "2025-02-08" ; "exactly thirty days")]
    #[test_case(Some("2024-12-01"), "2025-02-08" ; "clamped")]
    fn test_sync_window(last: Option<&str>, start: &str) {
        let today = date("2025-03-10");
        let window = sync_window(last.map(date), today);
        assert_eq!(window.start, date(start));
        assert_eq!(window.end, today);
    }

    #[test]
    fn test_backfill_windows() {
        let windows = backfill_windows(date("2025-03-01"), date("2025-03-20"));
        let spans: Vec<(NaiveDate, NaiveDate)> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(
            spans,
            [
                (date("2025-03-01"), date("2025-03-08")),
                (date("2025-03-09"), date("2025-03-16")),
                (date("2025-03-17"), date("2025-03-20")),
            ]
        );
    }

    #[test]
    fn test_backfill_from_future_is_empty() {
        assert!(backfill_windows(date("2025-04-01"), date("2025-03-20")).is_empty());
        assert_eq!(backfill_windows(date("2025-03-20"), date("2025-03-20")).len(), 1);
    }
}
