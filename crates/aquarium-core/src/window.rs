//! Time-of-day windows.
//!
//! A window is `[start, end)` in minutes since local midnight. When
//! `start > end` the window crosses midnight; `start == end` is empty.

use crate::error::{AquariumError, Result};

pub const MINUTES_PER_DAY: u16 = 1440;

/// Parse an `HH:MM` string into minutes since midnight.
///
/// Single-digit fields are accepted (`8:05`), anything outside a 24h clock
/// is rejected.
pub fn parse_hhmm(value: &str) -> Result<u16> {
    let malformed = |reason: &str| AquariumError::MalformedScheduleEntry {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let (h, m) = value
        .trim()
        .split_once(':')
        .ok_or_else(|| malformed("expected HH:MM"))?;
    let hour: u16 = h.parse().map_err(|_| malformed("hour is not a number"))?;
    let minute: u16 = m.parse().map_err(|_| malformed("minute is not a number"))?;
    if hour > 23 {
        return Err(malformed("hour out of range"));
    }
    if minute > 59 {
        return Err(malformed("minute out of range"));
    }
    Ok(hour * 60 + minute)
}

/// Format minutes since midnight as `HH:MM`.
pub fn format_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u16,
    pub end: u16,
}

impl Window {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, t: u16) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Minutes from `t` until the window closes, or `None` when `t` is outside.
    pub fn remaining_minutes(&self, t: u16) -> Option<u16> {
        if !self.contains(t) {
            return None;
        }
        if self.wraps_midnight() && t >= self.start {
            Some((MINUTES_PER_DAY - t) + self.end)
        } else {
            Some(self.end - t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_accepts_short_fields() {
        assert_eq!(parse_hhmm("08:05").unwrap(), 485);
        assert_eq!(parse_hhmm("8:5").unwrap(), 485);
        assert_eq!(parse_hhmm("00:00").unwrap(), 0);
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "noon", "24:00", "12:60", "12", "ab:cd", "-1:30"] {
            let err = parse_hhmm(bad).unwrap_err();
            assert!(
                matches!(err, AquariumError::MalformedScheduleEntry { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn format_pads() {
        assert_eq!(format_hhmm(485), "08:05");
        assert_eq!(format_hhmm(1439), "23:59");
    }

    #[test]
    fn overnight_window_before_midnight() {
        let w = Window::new(1200, 240);
        assert!(w.contains(1410));
        assert_eq!(w.remaining_minutes(1410), Some(270));
    }

    #[test]
    fn overnight_window_after_midnight() {
        let w = Window::new(1200, 240);
        assert!(w.contains(120));
        assert_eq!(w.remaining_minutes(120), Some(120));
    }

    #[test]
    fn end_is_exclusive() {
        let w = Window::new(1080, 1140);
        assert!(w.contains(1080));
        assert!(!w.contains(1140));
        assert_eq!(w.remaining_minutes(1140), None);
        let overnight = Window::new(1200, 240);
        assert!(!overnight.contains(240));
    }

    #[test]
    fn zero_length_window_never_triggers() {
        let w = Window::new(600, 600);
        for t in [0, 599, 600, 601, 1439] {
            assert!(!w.contains(t));
        }
    }

    proptest! {
        #[test]
        fn same_day_contains_matches_half_open_range(
            a in 0u16..MINUTES_PER_DAY,
            b in 0u16..MINUTES_PER_DAY,
            t in 0u16..MINUTES_PER_DAY,
        ) {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            let w = Window::new(start, end);
            prop_assert_eq!(w.contains(t), start <= t && t < end);
        }

        #[test]
        fn wrapping_contains_matches_either_side(
            a in 0u16..MINUTES_PER_DAY,
            b in 0u16..MINUTES_PER_DAY,
            t in 0u16..MINUTES_PER_DAY,
        ) {
            prop_assume!(a != b);
            let (start, end) = if a > b { (a, b) } else { (b, a) };
            let w = Window::new(start, end);
            prop_assert_eq!(w.contains(t), t >= start || t < end);
        }

        #[test]
        fn remaining_is_positive_and_bounded_when_contained(
            start in 0u16..MINUTES_PER_DAY,
            end in 0u16..MINUTES_PER_DAY,
            t in 0u16..MINUTES_PER_DAY,
        ) {
            let w = Window::new(start, end);
            match w.remaining_minutes(t) {
                Some(r) => {
                    prop_assert!(r > 0);
                    prop_assert!(r < MINUTES_PER_DAY);
                    prop_assert_eq!((t + r) % MINUTES_PER_DAY, end);
                }
                None => prop_assert!(!w.contains(t)),
            }
        }
    }
}
