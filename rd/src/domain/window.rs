//! Session time windows
//!
//! A window is a calendar date, a start time, and a count of consecutive
//! teaching units. The end time is always derived as
//! `start + session_count * UNIT_MINUTES`, never stored. Overlap math runs
//! on minutes-from-midnight so a derived end past 24:00 stays well-defined.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Length of one teaching unit in minutes
pub const UNIT_MINUTES: u32 = 50;

/// Date + start + unit count for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Calendar date of the session
    pub date: NaiveDate,

    /// Start time of the first unit
    pub start: NaiveTime,

    /// Number of consecutive units (>= 1)
    pub session_count: u32,
}

impl TimeWindow {
    pub fn new(date: NaiveDate, start: NaiveTime, session_count: u32) -> Self {
        debug!(%date, %start, session_count, "TimeWindow::new: called");
        TimeWindow {
            date,
            start,
            session_count,
        }
    }

    /// Start as minutes from midnight
    pub fn start_minutes(&self) -> u32 {
        self.start.hour() * 60 + self.start.minute()
    }

    /// Exclusive end as minutes from midnight; may exceed 24 * 60 for a
    /// window that runs past midnight
    pub fn end_minutes(&self) -> u32 {
        self.start_minutes() + self.duration_minutes()
    }

    /// Total duration in minutes
    pub fn duration_minutes(&self) -> u32 {
        self.session_count * UNIT_MINUTES
    }

    /// Derived end time of day (wraps at midnight, display only)
    pub fn end_time(&self) -> NaiveTime {
        let minutes = self.end_minutes() % (24 * 60);
        NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Half-open interval overlap on the same date. Back-to-back windows
    /// (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        if self.date != other.date {
            return false;
        }
        self.start_minutes() < other.end_minutes() && other.start_minutes() < self.end_minutes()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end_time().format("%H:%M")
        )
    }
}
