use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

/// Source of "now" for the engine. Injected so ticks can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Wall-clock position in the controller's local time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMoment {
    pub weekday: Weekday,
    /// Minutes since local midnight, `0..1440`.
    pub minute_of_day: u16,
}

impl LocalMoment {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self {
            weekday: local.weekday(),
            minute_of_day: (local.hour() * 60 + local.minute()) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }

    #[test]
    fn local_moment_applies_offset_across_midnight() {
        // 2026-03-02 is a Monday; 18:30 UTC is 01:30 Tuesday at UTC+07:00.
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 18, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let m = LocalMoment::at(now, offset);
        assert_eq!(m.weekday, Weekday::Tue);
        assert_eq!(m.minute_of_day, 90);
    }
}
