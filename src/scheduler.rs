//! C8: "smart cron" mode. Decides which branches are ripe for a scan this
//! run, per §4.8.

use jiff::{Timestamp, ToSpan, Unit};

/// Is a branch whose last scan was `last_scan` (if any) mature for a rescan,
/// given `now` and the configured interval?
///
/// No `last_scan` recorded, or an unparseable one, counts as mature (new /
/// recover); otherwise the branch is fresh and skipped silently.
pub fn is_ripe(last_scan: Option<Timestamp>, now: Timestamp, interval_days: i64) -> bool {
    let Some(last_scan) = last_scan else {
        return true;
    };
    let elapsed_days = now
        .since(last_scan)
        .map(|span| span.total(Unit::Day).unwrap_or(f64::INFINITY))
        .unwrap_or(f64::INFINITY);
    elapsed_days >= interval_days as f64
}

/// Default scan interval: comfortably past the 180-day minimum-retention
/// window (§4.8).
pub const DEFAULT_SCAN_INTERVAL_DAYS: i64 = 190;

/// A buffer for cron-mode stdout: only flushed if the run actually did
/// something, so external timers invoking `--cron` don't spam logs on
/// no-op runs (§4.8).
#[derive(Default)]
pub struct CronBuffer {
    lines: Vec<String>,
    did_work: bool,
}

impl CronBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn mark_work_done(&mut self) {
        self.did_work = true;
    }

    /// Prints the buffered lines iff work was actually performed.
    pub fn flush(self) {
        if self.did_work {
            for line in self.lines {
                println!("{line}");
            }
        }
    }
}
