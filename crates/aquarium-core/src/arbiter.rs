//! UV precedence between manual sessions and schedule windows.
//!
//! [`plan_uv`] is pure: it looks at the open UV record (if any), the active
//! windows and the local minute, and says what should happen. The engine
//! carries the plan out against the ledger and the dispatcher.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::ledger::ActionRecord;
use crate::schedule::UvSchedule;
use crate::types::{ActionStatus, TriggerSource};
use crate::window::Window;

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleAction {
    /// A manual session owns the UV; schedules are not evaluated.
    Preempted,
    /// Inside a window with nothing open: turn on for `remaining_minutes`.
    Enter { remaining_minutes: u16 },
    /// Already where we should be.
    Hold,
    /// Outside every window while a schedule record runs: turn off.
    Exit(ActionRecord),
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UvPlan {
    /// Manual record past its end, to be closed before anything else.
    pub expire_manual: Option<ActionRecord>,
    pub schedule: ScheduleAction,
}

/// The open manual record, if it is past its planned end.
pub fn manual_expiry(open: Option<&ActionRecord>, now: DateTime<Utc>) -> Option<ActionRecord> {
    open.filter(|r| r.trigger_source == TriggerSource::Manual && r.has_elapsed(now))
        .cloned()
}

/// First window containing `minute`, as minutes until it closes.
pub fn remaining_in_windows(windows: &[Window], minute: u16) -> Option<u16> {
    windows.iter().find_map(|w| w.remaining_minutes(minute))
}

/// Parse the active entries of a day, skipping any with bad times.
pub fn windows_from(entries: &[UvSchedule]) -> Vec<Window> {
    entries
        .iter()
        .filter_map(|entry| match Window::parse(&entry.start_time, &entry.end_time) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(schedule_id = %entry.id, error = %e, "skipping malformed uv schedule");
                None
            }
        })
        .collect()
}

pub fn plan_uv(
    now: DateTime<Utc>,
    minute: u16,
    open: Option<&ActionRecord>,
    windows: &[Window],
) -> UvPlan {
    let expire_manual = manual_expiry(open, now);
    let open = if expire_manual.is_some() { None } else { open };

    let schedule = match open {
        Some(r) if r.trigger_source == TriggerSource::Manual => ScheduleAction::Preempted,
        Some(r) => match remaining_in_windows(windows, minute) {
            Some(_) => ScheduleAction::Hold,
            None if r.status == ActionStatus::Running => ScheduleAction::Exit(r.clone()),
            None => ScheduleAction::Hold,
        },
        None => match remaining_in_windows(windows, minute) {
            Some(remaining_minutes) => ScheduleAction::Enter { remaining_minutes },
            None => ScheduleAction::Idle,
        },
    };

    UvPlan {
        expire_manual,
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceType;
    use chrono::{Duration, TimeZone, Weekday};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap()
    }

    fn record(source: TriggerSource, status: ActionStatus, end: DateTime<Utc>) -> ActionRecord {
        ActionRecord {
            id: Uuid::new_v4(),
            device_type: DeviceType::Uv,
            trigger_source: source,
            start_time: t0() - Duration::minutes(10),
            end_time: Some(end),
            status,
            value: 600,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn night() -> Vec<Window> {
        vec![Window::new(1200, 240)]
    }

    #[test]
    fn enter_when_inside_and_nothing_open() {
        let plan = plan_uv(t0(), 1410, None, &night());
        assert_eq!(plan.expire_manual, None);
        assert_eq!(
            plan.schedule,
            ScheduleAction::Enter {
                remaining_minutes: 270
            }
        );
    }

    #[test]
    fn running_manual_preempts_window() {
        let manual = record(TriggerSource::Manual, ActionStatus::Running, t0() + Duration::minutes(5));
        let plan = plan_uv(t0(), 1410, Some(&manual), &night());
        assert_eq!(plan.schedule, ScheduleAction::Preempted);
        assert!(plan.expire_manual.is_none());
    }

    #[test]
    fn expired_manual_is_closed_then_schedule_evaluated() {
        let manual = record(TriggerSource::Manual, ActionStatus::Running, t0() - Duration::minutes(1));
        let plan = plan_uv(t0(), 1410, Some(&manual), &night());
        assert_eq!(plan.expire_manual.as_ref().map(|r| r.id), Some(manual.id));
        assert_eq!(
            plan.schedule,
            ScheduleAction::Enter {
                remaining_minutes: 270
            }
        );

        let outside = plan_uv(t0(), 600, Some(&manual), &night());
        assert!(outside.expire_manual.is_some());
        assert_eq!(outside.schedule, ScheduleAction::Idle);
    }

    #[test]
    fn manual_at_exact_end_is_not_expired() {
        let manual = record(TriggerSource::Manual, ActionStatus::Running, t0());
        assert!(manual_expiry(Some(&manual), t0()).is_none());
        assert!(manual_expiry(Some(&manual), t0() + Duration::seconds(1)).is_some());
    }

    #[test]
    fn schedule_records_never_expire_as_manual() {
        let sched = record(TriggerSource::Schedule, ActionStatus::Running, t0() - Duration::hours(1));
        assert!(manual_expiry(Some(&sched), t0()).is_none());
    }

    #[test]
    fn hold_while_inside_with_schedule_running() {
        let sched = record(TriggerSource::Schedule, ActionStatus::Running, t0() + Duration::hours(2));
        let plan = plan_uv(t0(), 1300, Some(&sched), &night());
        assert_eq!(plan.schedule, ScheduleAction::Hold);
    }

    #[test]
    fn exit_only_when_running() {
        let running = record(TriggerSource::Schedule, ActionStatus::Running, t0());
        let plan = plan_uv(t0(), 600, Some(&running), &night());
        assert_eq!(plan.schedule, ScheduleAction::Exit(running));

        let pending = record(TriggerSource::Schedule, ActionStatus::Pending, t0());
        let plan = plan_uv(t0(), 600, Some(&pending), &night());
        assert_eq!(plan.schedule, ScheduleAction::Hold);
    }

    #[test]
    fn idle_outside_with_nothing_open() {
        assert_eq!(plan_uv(t0(), 600, None, &night()).schedule, ScheduleAction::Idle);
        assert_eq!(plan_uv(t0(), 600, None, &[]).schedule, ScheduleAction::Idle);
    }

    #[test]
    fn windows_are_aggregated() {
        let windows = vec![Window::new(360, 420), Window::new(1080, 1140)];
        assert_eq!(
            plan_uv(t0(), 1100, None, &windows).schedule,
            ScheduleAction::Enter {
                remaining_minutes: 40
            }
        );
        // Outside the first window but inside the second: keep running.
        let sched = record(TriggerSource::Schedule, ActionStatus::Running, t0());
        assert_eq!(
            plan_uv(t0(), 1100, Some(&sched), &windows).schedule,
            ScheduleAction::Hold
        );
    }

    #[test]
    fn zero_length_window_never_enters() {
        let windows = vec![Window::new(600, 600)];
        assert_eq!(plan_uv(t0(), 600, None, &windows).schedule, ScheduleAction::Idle);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let entry = |start: &str, end: &str| UvSchedule {
            id: Uuid::new_v4(),
            day_name: Weekday::Mon,
            start_time: start.to_string(),
            end_time: end.to_string(),
            active: true,
            created_at: t0(),
            updated_at: t0(),
        };
        let windows = windows_from(&[entry("25:00", "04:00"), entry("20:00", "04:00")]);
        assert_eq!(windows, vec![Window::new(1200, 240)]);
    }
}
