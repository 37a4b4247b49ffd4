//! Coarse (schedule) and fine (manual expiry) tick bodies.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::Engine;
use crate::arbiter::{manual_expiry, plan_uv, windows_from, ScheduleAction};
use crate::clock::LocalMoment;
use crate::dispatch::{Command, UvState};
use crate::error::Result;
use crate::feed::{feed_doses, normalize_feed_amount};
use crate::ledger::{ActionRecord, NewAction};
use crate::types::{ActionStatus, DeviceState, DeviceType, TriggerSource};
use crate::window::parse_hhmm;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ran(TickSummary),
    /// The previous run of the same tick was still in flight.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub feeds_dispatched: u32,
    pub manual_expired: bool,
    pub uv_entered: bool,
    pub uv_exited: bool,
}

impl Engine {
    /// Evaluate feeder times and UV windows for the current local minute.
    pub async fn coarse_tick(&self) -> Result<TickOutcome> {
        let Some(_permit) = self.coarse_guard.try_acquire() else {
            return Ok(TickOutcome::Skipped);
        };
        let now = self.now();
        let local = LocalMoment::at(now, self.settings.utc_offset);
        let mut summary = TickSummary::default();

        // Feeder and UV failures are independent.
        match self.feeder_tick(now, local).await {
            Ok(n) => summary.feeds_dispatched = n,
            Err(e) => error!(error = %e, "feeder evaluation failed"),
        }
        self.uv_tick(now, local, &mut summary).await?;

        Ok(TickOutcome::Ran(summary))
    }

    /// Close and switch off an expired manual UV session.
    pub async fn fine_tick(&self) -> Result<TickOutcome> {
        let Some(_permit) = self.fine_guard.try_acquire() else {
            return Ok(TickOutcome::Skipped);
        };
        let now = self.now();
        let open = self
            .db(|s| s.ledger().find_open(DeviceType::Uv, Some(TriggerSource::Manual)))
            .await?;
        let mut summary = TickSummary::default();
        if let Some(expired) = manual_expiry(open.as_ref(), now) {
            summary.manual_expired = self.expire_manual(expired).await?;
        }
        Ok(TickOutcome::Ran(summary))
    }

    async fn feeder_tick(&self, now: DateTime<Utc>, local: LocalMoment) -> Result<u32> {
        let day = local.weekday;
        let entries = self.db(move |s| s.schedules().list_active_feeder(day)).await?;
        let mut dispatched = 0;

        for entry in entries {
            let minute = match parse_hhmm(&entry.time) {
                Ok(m) => m,
                Err(e) => {
                    warn!(schedule_id = %entry.id, error = %e, "skipping malformed feeder schedule");
                    continue;
                }
            };
            if minute != local.minute_of_day {
                continue;
            }

            let since = now
                - chrono::Duration::from_std(self.settings.feeder_dedupe_window)
                    .unwrap_or_else(|_| chrono::Duration::minutes(1));
            let recent = self
                .db(move |s| {
                    s.ledger()
                        .find_recent(DeviceType::Feeder, TriggerSource::Schedule, since, now)
                })
                .await?;
            if let Some(prior) = recent {
                debug!(schedule_id = %entry.id, action_id = %prior.id, "feeder schedule already handled");
                continue;
            }

            let dose = self.settings.dose_grams;
            let requested = i64::from(entry.amount_grams);
            let new = NewAction {
                device_type: DeviceType::Feeder,
                trigger_source: TriggerSource::Schedule,
                value: normalize_feed_amount(requested, dose),
                end_time: None,
            };
            let command = Command::Feed {
                doses: feed_doses(requested, dose),
            };
            match self.dispatch_new(new, command).await {
                Ok(record) => {
                    dispatched += 1;
                    info!(schedule_id = %entry.id, action_id = %record.id, "scheduled feed dispatched");
                    if record.status == ActionStatus::Running {
                        self.mirror(DeviceType::Feeder, DeviceState::Dispensing, 0).await;
                    }
                }
                Err(e) if e.is_conflict() => {
                    warn!(schedule_id = %entry.id, error = %e, "feeder busy, scheduled feed skipped");
                }
                Err(e) => {
                    error!(schedule_id = %entry.id, error = %e, "scheduled feed failed");
                }
            }
        }
        Ok(dispatched)
    }

    async fn uv_tick(
        &self,
        now: DateTime<Utc>,
        local: LocalMoment,
        summary: &mut TickSummary,
    ) -> Result<()> {
        let day = local.weekday;
        let (entries, open) = self
            .db(move |s| {
                Ok((
                    s.schedules().list_active_uv(day)?,
                    s.ledger().find_open(DeviceType::Uv, None)?,
                ))
            })
            .await?;
        let windows = windows_from(&entries);
        let plan = plan_uv(now, local.minute_of_day, open.as_ref(), &windows);

        if let Some(expired) = plan.expire_manual {
            summary.manual_expired = self.expire_manual(expired).await?;
            if !summary.manual_expired {
                // The fine tick won the close and may still be sending OFF.
                debug!("manual uv expired elsewhere, schedule evaluation deferred");
                return Ok(());
            }
        }

        match plan.schedule {
            ScheduleAction::Enter { remaining_minutes } => {
                summary.uv_entered = self.enter_schedule(now, remaining_minutes).await;
            }
            ScheduleAction::Exit(record) => {
                summary.uv_exited = self.exit_schedule(record).await?;
            }
            ScheduleAction::Preempted => debug!("manual uv active, schedules not evaluated"),
            ScheduleAction::Hold => debug!("uv schedule holding"),
            ScheduleAction::Idle => debug!("uv idle"),
        }
        Ok(())
    }

    async fn enter_schedule(&self, now: DateTime<Utc>, remaining_minutes: u16) -> bool {
        let seconds = u32::from(remaining_minutes) * 60;
        let new = NewAction {
            device_type: DeviceType::Uv,
            trigger_source: TriggerSource::Schedule,
            value: seconds,
            end_time: Some(now + chrono::Duration::minutes(i64::from(remaining_minutes))),
        };
        let command = Command::Uv {
            state: UvState::On,
            duration_secs: 0,
        };
        match self.dispatch_new(new, command).await {
            Ok(record) => {
                info!(action_id = %record.id, remaining_minutes, "uv schedule window entered");
                if record.status == ActionStatus::Running {
                    self.mirror(DeviceType::Uv, DeviceState::On, seconds).await;
                }
                true
            }
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "uv busy, schedule entry skipped");
                false
            }
            Err(e) => {
                error!(error = %e, "uv schedule entry failed");
                false
            }
        }
    }

    async fn exit_schedule(&self, record: ActionRecord) -> Result<bool> {
        let now = self.now();
        let id = record.id;
        let closed = self
            .db(move |s| s.ledger().close(id, ActionStatus::Success, now))
            .await?;
        if closed.is_none() {
            debug!(action_id = %id, "uv schedule record already closed");
            return Ok(false);
        }
        if let Err(e) = self.dispatcher.send(Command::uv_off()).await {
            error!(action_id = %id, error = %e, "uv OFF failed at window exit");
        }
        self.mirror(DeviceType::Uv, DeviceState::Off, 0).await;
        info!(action_id = %id, "uv schedule window exited");
        Ok(true)
    }

    /// Close an expired manual record; only the writer that wins the close
    /// sends OFF. Returns whether this call won.
    async fn expire_manual(&self, record: ActionRecord) -> Result<bool> {
        let now = self.now();
        let id = record.id;
        let closed = self
            .db(move |s| s.ledger().close(id, ActionStatus::Success, now))
            .await?;
        if closed.is_none() {
            debug!(action_id = %id, "manual uv already closed");
            return Ok(false);
        }
        if let Err(e) = self.dispatcher.send(Command::uv_off()).await {
            error!(action_id = %id, error = %e, "uv OFF failed at manual expiry");
        }
        self.mirror(DeviceType::Uv, DeviceState::Off, 0).await;
        info!(action_id = %id, "manual uv expired");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::ledger::ActionFilter;
    use crate::schedule::{FeederScheduleInput, UvScheduleInput};
    use chrono::{Duration, TimeZone, Weekday};
    use std::sync::Arc;

    /// Monday 08:00:05 at UTC+07:00.
    fn feed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 5).unwrap()
    }

    /// Monday 20:10 at UTC+07:00.
    fn uv_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 13, 10, 0).unwrap()
    }

    fn add_feeder(h: &Harness, time: &str) {
        h.store()
            .schedules()
            .create_feeder(
                FeederScheduleInput {
                    day_name: Weekday::Mon,
                    time: time.into(),
                    amount_grams: Some(15),
                    active: None,
                },
                5,
                h.engine.now(),
            )
            .unwrap();
    }

    fn add_uv(h: &Harness, start: &str, end: &str) {
        h.store()
            .schedules()
            .create_uv(
                UvScheduleInput {
                    day_name: Weekday::Mon,
                    start_time: start.into(),
                    end_time: end.into(),
                    active: None,
                },
                h.engine.now(),
            )
            .unwrap();
    }

    fn records(h: &Harness, device: DeviceType) -> Vec<ActionRecord> {
        let filter = ActionFilter {
            device_type: Some(device),
            ..Default::default()
        };
        h.store().ledger().list(&filter, 0, 100).unwrap().records
    }

    fn ran(outcome: TickOutcome) -> TickSummary {
        match outcome {
            TickOutcome::Ran(s) => s,
            TickOutcome::Skipped => panic!("tick skipped"),
        }
    }

    fn off_count(h: &Harness) -> usize {
        h.transport
            .sent()
            .iter()
            .filter(|c| **c == Command::uv_off())
            .count()
    }

    #[tokio::test]
    async fn scheduled_feed_fires_once_per_minute() {
        let h = Harness::at(feed_time());
        add_feeder(&h, "08:00");

        let first = ran(h.engine.coarse_tick().await.unwrap());
        assert_eq!(first.feeds_dispatched, 1);

        h.clock.advance(Duration::seconds(40));
        let second = ran(h.engine.coarse_tick().await.unwrap());
        assert_eq!(second.feeds_dispatched, 0);

        let feeds = records(&h, DeviceType::Feeder);
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].value, 15);
        assert_eq!(feeds[0].trigger_source, TriggerSource::Schedule);
        assert_eq!(h.transport.sent(), vec![Command::Feed { doses: 2 }]);
    }

    #[tokio::test]
    async fn dedupe_covers_failed_attempts() {
        let h = Harness::at(feed_time());
        add_feeder(&h, "08:00");
        h.transport.fail_next("offline");
        let first = ran(h.engine.coarse_tick().await.unwrap());
        assert_eq!(first.feeds_dispatched, 0);
        assert_eq!(records(&h, DeviceType::Feeder)[0].status, ActionStatus::Failed);

        h.clock.advance(Duration::seconds(30));
        h.engine.coarse_tick().await.unwrap();
        assert_eq!(records(&h, DeviceType::Feeder).len(), 1);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn feeder_ignores_other_minutes() {
        let h = Harness::at(feed_time());
        add_feeder(&h, "08:01");
        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert_eq!(summary.feeds_dispatched, 0);
        assert!(records(&h, DeviceType::Feeder).is_empty());
    }

    #[tokio::test]
    async fn manual_feed_in_flight_blocks_schedule() {
        let h = Harness::at(feed_time());
        add_feeder(&h, "08:00");
        h.engine.trigger_manual_feed(10).await.unwrap();
        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert_eq!(summary.feeds_dispatched, 0);
        assert_eq!(records(&h, DeviceType::Feeder).len(), 1);
    }

    #[tokio::test]
    async fn overlapping_coarse_tick_is_skipped() {
        let h = Harness::at(feed_time());
        let _held = h.engine.coarse_guard.try_acquire().unwrap();
        assert_eq!(h.engine.coarse_tick().await.unwrap(), TickOutcome::Skipped);
        // The fine tick has its own guard.
        assert!(matches!(h.engine.fine_tick().await.unwrap(), TickOutcome::Ran(_)));
    }

    #[tokio::test]
    async fn window_entry_then_exit() {
        let h = Harness::at(uv_time());
        add_uv(&h, "20:00", "20:30");

        let entered = ran(h.engine.coarse_tick().await.unwrap());
        assert!(entered.uv_entered);
        let rec = &records(&h, DeviceType::Uv)[0];
        assert_eq!(rec.status, ActionStatus::Running);
        assert_eq!(rec.value, 20 * 60);
        assert_eq!(rec.end_time, Some(uv_time() + Duration::minutes(20)));
        assert_eq!(
            h.transport.sent(),
            vec![Command::Uv {
                state: UvState::On,
                duration_secs: 0
            }]
        );

        h.clock.advance(Duration::minutes(5));
        let held = ran(h.engine.coarse_tick().await.unwrap());
        assert!(!held.uv_entered && !held.uv_exited);
        assert_eq!(h.transport.sent().len(), 1);

        h.clock.advance(Duration::minutes(16));
        let exited = ran(h.engine.coarse_tick().await.unwrap());
        assert!(exited.uv_exited);
        assert_eq!(records(&h, DeviceType::Uv)[0].status, ActionStatus::Success);
        assert_eq!(off_count(&h), 1);
        let status = h.engine.device_status(DeviceType::Uv).await.unwrap();
        assert_eq!(status.status, DeviceState::Off);

        h.clock.advance(Duration::minutes(1));
        h.engine.coarse_tick().await.unwrap();
        assert_eq!(off_count(&h), 1);
    }

    #[tokio::test]
    async fn overnight_window_ends_at_midnight_without_next_day_entry() {
        let h = Harness::at(uv_time());
        add_uv(&h, "20:00", "04:00");
        assert!(ran(h.engine.coarse_tick().await.unwrap()).uv_entered);
        let rec = &records(&h, DeviceType::Uv)[0];
        assert_eq!(rec.end_time, Some(uv_time() + Duration::minutes(470)));

        // Tuesday 00:00: only Tuesday's entries are evaluated.
        h.clock.advance(Duration::minutes(230));
        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert!(summary.uv_exited);
        let rec = &records(&h, DeviceType::Uv)[0];
        assert_eq!(rec.status, ActionStatus::Success);
        assert_eq!(rec.end_time, Some(uv_time() + Duration::minutes(230)));
    }

    #[tokio::test]
    async fn overnight_window_holds_past_midnight_with_next_day_entry() {
        let h = Harness::at(uv_time());
        add_uv(&h, "20:00", "04:00");
        h.store()
            .schedules()
            .create_uv(
                UvScheduleInput {
                    day_name: Weekday::Tue,
                    start_time: "20:00".into(),
                    end_time: "04:00".into(),
                    active: None,
                },
                h.engine.now(),
            )
            .unwrap();
        assert!(ran(h.engine.coarse_tick().await.unwrap()).uv_entered);

        h.clock.advance(Duration::minutes(230));
        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert!(!summary.uv_exited && !summary.uv_entered);

        // Tuesday 04:00.
        h.clock.advance(Duration::minutes(240));
        assert!(ran(h.engine.coarse_tick().await.unwrap()).uv_exited);
        assert_eq!(records(&h, DeviceType::Uv).len(), 1);
    }

    #[tokio::test]
    async fn running_manual_blocks_schedule_entry() {
        let h = Harness::at(uv_time());
        add_uv(&h, "20:00", "04:00");
        let manual = h.engine.trigger_manual_uv(10).await.unwrap();

        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert!(!summary.uv_entered);
        let uv = records(&h, DeviceType::Uv);
        assert_eq!(uv.len(), 1);
        assert_eq!(uv[0].id, manual.action_id);
    }

    #[tokio::test]
    async fn manual_uv_end_to_end_expiry() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        let h = Harness::at(t0);
        let manual = h.engine.trigger_manual_uv(30).await.unwrap();
        let rec = h.store().ledger().get(manual.action_id).unwrap();
        assert_eq!(rec.status, ActionStatus::Running);
        assert_eq!(rec.value, 1800);
        assert_eq!(rec.end_time, Some(t0 + Duration::minutes(30)));

        h.clock.advance(Duration::minutes(31));
        let summary = ran(h.engine.fine_tick().await.unwrap());
        assert!(summary.manual_expired);

        let rec = h.store().ledger().get(manual.action_id).unwrap();
        assert_eq!(rec.status, ActionStatus::Success);
        assert_eq!(off_count(&h), 1);
        let status = h.engine.device_status(DeviceType::Uv).await.unwrap();
        assert_eq!(status.status, DeviceState::Off);
        assert_eq!(status.remaining_seconds, 0);
    }

    #[tokio::test]
    async fn fine_tick_leaves_unexpired_manual_alone() {
        let h = Harness::at(uv_time());
        h.engine.trigger_manual_uv(30).await.unwrap();
        h.clock.advance(Duration::minutes(30));
        let summary = ran(h.engine.fine_tick().await.unwrap());
        assert!(!summary.manual_expired);
        assert_eq!(off_count(&h), 0);
    }

    #[tokio::test]
    async fn expiry_happens_once_across_sequential_ticks() {
        let h = Harness::at(Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap());
        h.engine.trigger_manual_uv(1).await.unwrap();
        h.clock.advance(Duration::minutes(2));

        let coarse = ran(h.engine.coarse_tick().await.unwrap());
        let fine = ran(h.engine.fine_tick().await.unwrap());
        assert!(coarse.manual_expired);
        assert!(!fine.manual_expired);
        assert_eq!(off_count(&h), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn expiry_happens_once_across_concurrent_ticks() {
        for _ in 0..10 {
            let h = Harness::at(Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap());
            let manual = h.engine.trigger_manual_uv(1).await.unwrap();
            h.clock.advance(Duration::minutes(2));

            let (a, b) = (h.engine.clone(), h.engine.clone());
            let coarse = tokio::spawn(async move { a.coarse_tick().await });
            let fine = tokio::spawn(async move { b.fine_tick().await });
            let coarse = ran(coarse.await.unwrap().unwrap());
            let fine = ran(fine.await.unwrap().unwrap());

            assert!(coarse.manual_expired ^ fine.manual_expired);
            assert_eq!(off_count(&h), 1);
            assert_eq!(
                h.store().ledger().get(manual.action_id).unwrap().status,
                ActionStatus::Success
            );
        }
    }

    #[tokio::test]
    async fn schedule_resumes_after_manual_expires() {
        let h = Harness::at(uv_time());
        add_uv(&h, "20:00", "04:00");
        h.engine.coarse_tick().await.unwrap();
        h.clock.advance(Duration::minutes(1));
        h.engine.trigger_manual_uv(5).await.unwrap();

        h.clock.advance(Duration::minutes(6));
        let summary = ran(h.engine.coarse_tick().await.unwrap());
        assert!(summary.manual_expired);
        assert!(summary.uv_entered);

        let uv = records(&h, DeviceType::Uv);
        let statuses: Vec<_> = uv.iter().map(|r| (r.trigger_source, r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (TriggerSource::Schedule, ActionStatus::Running),
                (TriggerSource::Manual, ActionStatus::Success),
                (TriggerSource::Schedule, ActionStatus::Overridden),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_open_record_under_concurrent_triggers() {
        let h = Harness::at(feed_time());
        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let engine = Arc::clone(&h.engine);
                tokio::spawn(async move { engine.trigger_manual_feed(10).await })
            })
            .collect();
        let mut ok = 0;
        let mut conflicts = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected {e:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 9);
        assert_eq!(h.transport.sent().len(), 1);
    }
}
