//! # Sync Windows
//!
//! Time arithmetic shared by the orchestrator and the scheduler.
//!
//! ## Window Continuity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   run 1:  [ w0 ─────────── e1 ]                                         │
//! │   run 2:                  [ e1 ─────────── e2 ]                          │
//! │   run 3:                                  [ e2 ──── e3 ]                │
//! │                                                                         │
//! │   e_i is captured when run i starts. Records created while run i is    │
//! │   still fetching land after e_i and are picked up by run i+1.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inclusive creation-time range fetched by one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Opens a window from the persisted watermark up to `now`.
    ///
    /// A watermark ahead of `now` (clock moved backwards) yields an empty
    /// window at the watermark instead of an inverted range.
    pub fn open(watermark: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        SyncWindow {
            start: watermark,
            end: now.max(watermark),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Watermark to persist once this window has been fully processed.
    #[inline]
    pub fn next_watermark(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Time until the next scheduled run: `max(0, interval - (now - last_run_at))`.
///
/// A state that was seeded but never run is due immediately.
pub fn next_run_delay(
    interval: Duration,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(last) = last_run_at else {
        return Duration::ZERO;
    };

    // Future timestamps (clock skew) count as "just ran".
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}
