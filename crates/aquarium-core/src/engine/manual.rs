//! Entry points for user-initiated actions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::Engine;
use crate::dispatch::{Command, UvState};
use crate::error::{AquariumError, Result};
use crate::feed::{feed_doses, normalize_feed_amount};
use crate::ledger::{ActionRecord, NewAction};
use crate::types::{ActionStatus, DeviceState, DeviceType, TriggerSource};

#[derive(Debug, Clone, Serialize)]
pub struct ManualFeed {
    pub action_id: Uuid,
    pub amount_grams: u32,
    pub doses: u32,
    pub status: ActionStatus,
    /// Previous successful feed, if any.
    pub last_feed: Option<ActionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualUv {
    pub action_id: Uuid,
    pub duration_minutes: u32,
    pub end_time: DateTime<Utc>,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoppedUv {
    pub action_id: Uuid,
    pub trigger_source: TriggerSource,
    pub stopped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatusView {
    pub device_type: DeviceType,
    pub status: DeviceState,
    pub remaining_seconds: u32,
    pub last_updated: DateTime<Utc>,
    pub manual_active: bool,
    pub manual_end_time: Option<DateTime<Utc>>,
}

impl Engine {
    pub async fn trigger_manual_feed(&self, amount_grams: i64) -> Result<ManualFeed> {
        let dose = self.settings.dose_grams;
        let amount = normalize_feed_amount(amount_grams, dose);
        let doses = feed_doses(amount_grams, dose);
        let last_feed = self
            .db(|s| s.ledger().last_success(DeviceType::Feeder))
            .await?;

        let record = self
            .dispatch_new(
                NewAction {
                    device_type: DeviceType::Feeder,
                    trigger_source: TriggerSource::Manual,
                    value: amount,
                    end_time: None,
                },
                Command::Feed { doses },
            )
            .await?;
        if record.status == ActionStatus::Running {
            self.mirror(DeviceType::Feeder, DeviceState::Dispensing, 0).await;
        }
        info!(action_id = %record.id, amount_grams = amount, doses, "manual feed started");

        Ok(ManualFeed {
            action_id: record.id,
            amount_grams: amount,
            doses,
            status: record.status,
            last_feed,
        })
    }

    /// Turn the UV on for `duration_minutes`, overriding any schedule.
    pub async fn trigger_manual_uv(&self, duration_minutes: i64) -> Result<ManualUv> {
        if duration_minutes <= 0 {
            return Err(AquariumError::Validation(
                "duration_minutes must be greater than 0".to_string(),
            ));
        }
        let minutes = u32::try_from(duration_minutes)
            .ok()
            .filter(|m| m.checked_mul(60).is_some())
            .ok_or_else(|| {
                AquariumError::Validation(format!("duration_minutes too large: {duration_minutes}"))
            })?;
        let seconds = minutes * 60;

        let open = self.db(|s| s.ledger().find_open(DeviceType::Uv, None)).await?;
        let overridden = open
            .filter(|r| r.trigger_source == TriggerSource::Schedule)
            .map(|r| r.id);

        let now = self.now();
        let end_time = now + chrono::Duration::seconds(i64::from(seconds));
        let new = NewAction {
            device_type: DeviceType::Uv,
            trigger_source: TriggerSource::Manual,
            value: seconds,
            end_time: Some(end_time),
        };
        let claimed = self
            .db(move |s| match overridden {
                Some(schedule_id) => s.ledger().supersede(schedule_id, new, now),
                None => s.ledger().open_pending(new, now),
            })
            .await?;
        if let Some(schedule_id) = overridden {
            info!(action_id = %schedule_id, replaced_by = %claimed.id, "schedule uv overridden by manual request");
        }

        let command = Command::Uv {
            state: UvState::On,
            duration_secs: seconds,
        };
        let record = match self.dispatch_claimed(claimed.id, command).await {
            Ok(record) => record,
            Err(e) => {
                if overridden.is_some() && matches!(e, AquariumError::Dispatch(_)) {
                    self.release_overridden_lamp().await;
                }
                return Err(e);
            }
        };
        if record.status == ActionStatus::Running {
            self.mirror(DeviceType::Uv, DeviceState::On, seconds).await;
        }
        info!(action_id = %record.id, duration_minutes = minutes, end_time = %end_time, "manual uv started");

        Ok(ManualUv {
            action_id: record.id,
            duration_minutes: minutes,
            end_time,
            status: record.status,
        })
    }

    /// The schedule record was closed for a manual run that never started,
    /// so nothing in the ledger owns the lamp. Switch it off to match.
    async fn release_overridden_lamp(&self) {
        match self.dispatcher.send(Command::uv_off()).await {
            Ok(()) => self.mirror(DeviceType::Uv, DeviceState::Off, 0).await,
            Err(e) => warn!(error = %e, "uv left on after failed manual override"),
        }
    }

    /// Stop whatever UV action is running, manual or scheduled.
    ///
    /// OFF is sent before the ledger is touched; if it fails the record
    /// stays running.
    pub async fn stop_uv(&self) -> Result<StoppedUv> {
        let running = self
            .db(|s| s.ledger().find_open(DeviceType::Uv, None))
            .await?
            .filter(|r| r.status == ActionStatus::Running)
            .ok_or(AquariumError::NoRunningAction(DeviceType::Uv))?;

        self.dispatcher.send(Command::uv_off()).await?;

        let now = self.now();
        let id = running.id;
        if self
            .db(move |s| s.ledger().close(id, ActionStatus::Stopped, now))
            .await?
            .is_none()
        {
            warn!(action_id = %id, "uv action closed concurrently with stop");
        }
        self.mirror(DeviceType::Uv, DeviceState::Off, 0).await;
        info!(action_id = %id, source = %running.trigger_source, "uv stopped");

        Ok(StoppedUv {
            action_id: id,
            trigger_source: running.trigger_source,
            stopped_at: now,
        })
    }

    pub async fn device_status(&self, device: DeviceType) -> Result<DeviceStatusView> {
        let (row, manual) = self
            .db(move |s| {
                Ok((
                    s.status().get(device)?,
                    s.ledger().find_open(device, Some(TriggerSource::Manual))?,
                ))
            })
            .await?;
        Ok(DeviceStatusView {
            device_type: device,
            status: row.status,
            remaining_seconds: row.remaining_seconds,
            last_updated: row.last_updated,
            manual_active: manual.is_some(),
            manual_end_time: manual.and_then(|r| r.end_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::{Command, UvState};
    use crate::engine::harness::Harness;
    use crate::error::AquariumError;
    use crate::ledger::ActionFilter;
    use crate::schedule::UvScheduleInput;
    use crate::types::{ActionStatus, DeviceState, DeviceType, TriggerSource};
    use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};

    /// Monday 10:00 at UTC+07:00.
    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap()
    }

    /// Monday 20:30 at UTC+07:00.
    fn evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap()
    }

    fn add_night_window(h: &Harness) {
        h.store()
            .schedules()
            .create_uv(
                UvScheduleInput {
                    day_name: Weekday::Mon,
                    start_time: "20:00".into(),
                    end_time: "04:00".into(),
                    active: None,
                },
                h.engine.now(),
            )
            .unwrap();
    }

    fn by_source(h: &Harness, source: TriggerSource) -> Vec<crate::ledger::ActionRecord> {
        let filter = ActionFilter {
            device_type: Some(DeviceType::Uv),
            trigger_source: Some(source),
            ..Default::default()
        };
        h.store().ledger().list(&filter, 0, 100).unwrap().records
    }

    #[tokio::test]
    async fn manual_feed_rounds_doses_up() {
        let h = Harness::at(morning());
        let out = h.engine.trigger_manual_feed(25).await.unwrap();
        assert_eq!(out.amount_grams, 25);
        assert_eq!(out.doses, 3);
        assert_eq!(out.status, ActionStatus::Running);
        assert!(out.last_feed.is_none());
        assert_eq!(h.transport.sent(), vec![Command::Feed { doses: 3 }]);
        let status = h.engine.device_status(DeviceType::Feeder).await.unwrap();
        assert_eq!(status.status, DeviceState::Dispensing);
    }

    #[tokio::test]
    async fn manual_feed_zero_becomes_one_dose() {
        let h = Harness::at(morning());
        let out = h.engine.trigger_manual_feed(0).await.unwrap();
        assert_eq!(out.amount_grams, 10);
        assert_eq!(out.doses, 1);
    }

    #[tokio::test]
    async fn second_manual_feed_conflicts_while_first_open() {
        let h = Harness::at(morning());
        let first = h.engine.trigger_manual_feed(10).await.unwrap();
        let err = h.engine.trigger_manual_feed(10).await.unwrap_err();
        match err {
            AquariumError::Conflict { device, action_id } => {
                assert_eq!(device, DeviceType::Feeder);
                assert_eq!(action_id, first.action_id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn manual_uv_rejects_non_positive_duration() {
        let h = Harness::at(morning());
        for bad in [0, -5] {
            let err = h.engine.trigger_manual_uv(bad).await.unwrap_err();
            assert!(matches!(err, AquariumError::Validation(_)));
        }
        let page = h.store().ledger().list(&Default::default(), 0, 10).unwrap();
        assert_eq!(page.total, 0);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn manual_uv_records_seconds_and_end() {
        let h = Harness::at(morning());
        let out = h.engine.trigger_manual_uv(30).await.unwrap();
        assert_eq!(out.end_time, morning() + Duration::minutes(30));

        let rec = h.store().ledger().get(out.action_id).unwrap();
        assert_eq!(rec.status, ActionStatus::Running);
        assert_eq!(rec.value, 1800);
        assert_eq!(rec.trigger_source, TriggerSource::Manual);
        assert_eq!(
            h.transport.sent(),
            vec![Command::Uv {
                state: UvState::On,
                duration_secs: 1800
            }]
        );

        let status = h.engine.device_status(DeviceType::Uv).await.unwrap();
        assert_eq!(status.status, DeviceState::On);
        assert_eq!(status.remaining_seconds, 1800);
        assert!(status.manual_active);
        assert_eq!(status.manual_end_time, Some(out.end_time));
    }

    #[tokio::test]
    async fn manual_uv_overrides_running_schedule() {
        let h = Harness::at(evening());
        add_night_window(&h);
        h.engine.coarse_tick().await.unwrap();
        let scheduled = by_source(&h, TriggerSource::Schedule);
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].status, ActionStatus::Running);

        let manual = h.engine.trigger_manual_uv(5).await.unwrap();
        let scheduled = h.store().ledger().get(scheduled[0].id).unwrap();
        assert_eq!(scheduled.status, ActionStatus::Overridden);
        assert_eq!(
            h.store().ledger().get(manual.action_id).unwrap().status,
            ActionStatus::Running
        );
    }

    #[tokio::test]
    async fn failed_override_switches_lamp_off() {
        let h = Harness::at(evening());
        add_night_window(&h);
        h.engine.coarse_tick().await.unwrap();
        let scheduled = by_source(&h, TriggerSource::Schedule).remove(0);

        h.transport.fail_next("offline");
        let err = h.engine.trigger_manual_uv(10).await.unwrap_err();
        assert!(matches!(err, AquariumError::Dispatch(_)));

        assert_eq!(
            h.store().ledger().get(scheduled.id).unwrap().status,
            ActionStatus::Overridden
        );
        let manual = by_source(&h, TriggerSource::Manual);
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].status, ActionStatus::Failed);
        assert!(h
            .store()
            .ledger()
            .find_open(DeviceType::Uv, None)
            .unwrap()
            .is_none());

        assert_eq!(h.transport.sent().last(), Some(&Command::uv_off()));
        let status = h.engine.device_status(DeviceType::Uv).await.unwrap();
        assert_eq!(status.status, DeviceState::Off);
    }

    #[tokio::test]
    async fn manual_uv_conflicts_with_open_manual_run() {
        let h = Harness::at(morning());
        let first = h.engine.trigger_manual_uv(10).await.unwrap();
        let err = h.engine.trigger_manual_uv(10).await.unwrap_err();
        assert!(
            matches!(err, AquariumError::Conflict { action_id, .. } if action_id == first.action_id)
        );
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn stop_without_running_uv_is_not_found() {
        let h = Harness::at(morning());
        let err = h.engine.stop_uv().await.unwrap_err();
        assert!(matches!(err, AquariumError::NoRunningAction(DeviceType::Uv)));
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn stop_closes_as_stopped_and_sends_off() {
        let h = Harness::at(morning());
        let manual = h.engine.trigger_manual_uv(30).await.unwrap();
        h.clock.advance(Duration::minutes(3));
        let stopped = h.engine.stop_uv().await.unwrap();
        assert_eq!(stopped.action_id, manual.action_id);
        assert_eq!(stopped.trigger_source, TriggerSource::Manual);

        let rec = h.store().ledger().get(manual.action_id).unwrap();
        assert_eq!(rec.status, ActionStatus::Stopped);
        assert_eq!(rec.end_time, Some(morning() + Duration::minutes(3)));
        assert_eq!(h.transport.sent().last(), Some(&Command::uv_off()));

        let status = h.engine.device_status(DeviceType::Uv).await.unwrap();
        assert_eq!(status.status, DeviceState::Off);
        assert_eq!(status.remaining_seconds, 0);
        assert!(!status.manual_active);
    }

    #[tokio::test]
    async fn stop_stops_schedule_records_too() {
        let h = Harness::at(evening());
        add_night_window(&h);
        h.engine.coarse_tick().await.unwrap();
        let stopped = h.engine.stop_uv().await.unwrap();
        assert_eq!(stopped.trigger_source, TriggerSource::Schedule);
    }

    #[tokio::test]
    async fn failed_off_leaves_record_running() {
        let h = Harness::at(morning());
        let manual = h.engine.trigger_manual_uv(30).await.unwrap();
        h.transport.fail_next("broker down");
        let err = h.engine.stop_uv().await.unwrap_err();
        assert!(matches!(err, AquariumError::Dispatch(_)));
        assert_eq!(
            h.store().ledger().get(manual.action_id).unwrap().status,
            ActionStatus::Running
        );
    }

    #[tokio::test]
    async fn last_feed_reports_previous_success() {
        let h = Harness::at(morning());
        let first = h.engine.trigger_manual_feed(10).await.unwrap();
        h.store()
            .ledger()
            .close(first.action_id, ActionStatus::Success, morning())
            .unwrap();
        h.clock.advance(Duration::minutes(1));
        let second = h.engine.trigger_manual_feed(10).await.unwrap();
        assert_eq!(second.last_feed.map(|r| r.id), Some(first.action_id));
    }
}
