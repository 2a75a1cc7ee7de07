// src/utils/clock.rs
//! Injectable time source.
//!
//! Expiry checks, challenge windows and age arithmetic all read time through
//! [`Clock`] so tests can pin exact instants.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::Instant;

/// Longest login challenge or session window the service accepts (one year).
pub const MAX_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

/// [`MAX_WINDOW_SECS`] as a duration.
pub fn max_window() -> TimeDelta {
    TimeDelta::seconds(MAX_WINDOW_SECS)
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date in UTC, used for age computation.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Process clock that never steps backwards.
///
/// UTC is read once at construction; every later reading adds the monotonic
/// time elapsed since then. Token expiries and challenge windows therefore
/// ignore system clock adjustments, at the cost of drifting from corrected
/// wall time over a long uptime.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: Utc::now(),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.anchor.checked_add_signed(elapsed))
            .unwrap_or_else(Utc::now)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock by `by`. A step past the representable range is ignored.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = now.checked_add_signed(by) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::seconds(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let mut last = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next >= last);
            last = next;
        }
        assert!((Utc::now() - last).num_seconds().abs() < 5);
    }
}
