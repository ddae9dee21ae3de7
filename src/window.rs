//! Time-of-day activity window for polling.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};

/// Hours `[start, end)` in a fixed UTC offset during which polling runs.
/// `start > end` wraps past midnight; `start == end` means all day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub offset: FixedOffset,
    /// How long to sleep before looking at the clock again while outside.
    pub recheck: Duration,
}

impl ActiveWindow {
    pub fn new(start_hour: u32, end_hour: u32, offset: FixedOffset) -> Option<Self> {
        if start_hour > 23 || end_hour > 23 {
            return None;
        }
        Some(Self {
            start_hour,
            end_hour,
            offset,
            recheck: Duration::from_secs(600),
        })
    }

    pub fn with_offset_hours(mut self, hours: i32) -> Option<Self> {
        self.offset = hours.checked_mul(3600).and_then(FixedOffset::east_opt)?;
        Some(self)
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let hour = self.local_time(now).hour();
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl fmt::Display for ActiveWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00 (UTC{})", self.start_hour, self.end_hour, self.offset)
    }
}

impl FromStr for ActiveWindow {
    type Err = String;

    /// Parses `"H1-H2"`, e.g. `"8-2"`, in UTC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END hours, got {:?}", s))?;
        let start: u32 = start.trim().parse().map_err(|_| format!("bad start hour in {:?}", s))?;
        let end: u32 = end.trim().parse().map_err(|_| format!("bad end hour in {:?}", s))?;
        let utc = FixedOffset::east_opt(0).ok_or("bad offset")?;
        ActiveWindow::new(start, end, utc).ok_or_else(|| format!("hours must be 0-23, got {:?}", s))
    }
}
