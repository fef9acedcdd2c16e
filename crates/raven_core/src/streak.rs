//! crates/raven_core/src/streak.rs
//!
//! The streak state machine. Transitions are keyed by calendar day in a single
//! fixed zone, never by raw timestamps.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use crate::badges;
use crate::domain::{StreakRecord, Tally};

/// The calendar day `now` falls on in `zone`.
pub fn calendar_day(now: DateTime<Utc>, zone: FixedOffset) -> NaiveDate {
    now.with_timezone(&zone).date_naive()
}

impl StreakRecord {
    /// Applies one "a poem was written on `today`" event and re-evaluates badges.
    ///
    /// Writing again on the same day returns the record unchanged. A `today`
    /// earlier than the last write (clock moved backwards) is ignored the same way.
    pub fn record_write(&self, today: NaiveDate, tally: Tally, now: DateTime<Utc>) -> StreakRecord {
        let mut next = self.clone();

        match self.last_write_date {
            None => {
                next.current = 1;
                next.longest = self.longest.max(1);
            }
            Some(last) => {
                let gap = (today - last).num_days();
                if gap <= 0 {
                    return next;
                }
                if gap == 1 {
                    next.current = self.current + 1;
                    next.longest = self.longest.max(next.current);
                } else {
                    next.current = 1;
                    // keep longest >= current for records written by older builds
                    next.longest = self.longest.max(1);
                }
            }
        }

        next.last_write_date = Some(today);
        next.badges = badges::evaluate(&next, tally, now);
        next
    }
}
