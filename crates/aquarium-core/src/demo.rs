//! Demo data for a fresh install, and the matching reset.

use chrono::{DateTime, Utc, Weekday};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::schedule::{FeederScheduleInput, UvScheduleInput};
use crate::store::Store;

const WEEKDAY_FEEDS: [&str; 3] = ["08:00", "12:00", "18:00"];
const WEEKEND_FEEDS: [&str; 1] = ["09:00"];
const UV_WINDOW: (&str, &str) = ("20:00", "04:00");
pub const DEMO_STOCK_GRAMS: u64 = 1000;

const DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SeedReport {
    pub feeder_schedules: usize,
    pub uv_schedules: usize,
    /// Set only when the stock had never been recorded.
    pub stock_grams: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ClearReport {
    pub actions_removed: usize,
    pub feeder_schedules_removed: usize,
    pub uv_schedules_removed: usize,
}

/// Insert the demo week. Each part is skipped when data already exists.
pub fn seed(
    store: &Store,
    dose_grams: u32,
    max_per_day: usize,
    now: DateTime<Utc>,
) -> Result<SeedReport> {
    let book = store.schedules();
    let mut report = SeedReport::default();

    if book.list_feeder()?.is_empty() {
        for day in DAYS {
            let times: &[&str] = match day {
                Weekday::Sat | Weekday::Sun => &WEEKEND_FEEDS,
                _ => &WEEKDAY_FEEDS,
            };
            for time in times {
                book.create_feeder(
                    FeederScheduleInput {
                        day_name: day,
                        time: time.to_string(),
                        amount_grams: Some(dose_grams),
                        active: Some(true),
                    },
                    max_per_day,
                    now,
                )?;
                report.feeder_schedules += 1;
            }
        }
    }

    if book.list_uv()?.is_empty() {
        for day in DAYS {
            book.create_uv(
                UvScheduleInput {
                    day_name: day,
                    start_time: UV_WINDOW.0.to_string(),
                    end_time: UV_WINDOW.1.to_string(),
                    active: Some(true),
                },
                now,
            )?;
            report.uv_schedules += 1;
        }
    }

    if store.stock().get()?.updated_at.is_none() {
        store.stock().set(DEMO_STOCK_GRAMS, now)?;
        report.stock_grams = Some(DEMO_STOCK_GRAMS);
    }

    info!(
        feeder = report.feeder_schedules,
        uv = report.uv_schedules,
        "demo data seeded"
    );
    Ok(report)
}

/// Remove closed actions and every schedule, and empty the stock.
///
/// Open actions are kept; the devices they hold are still working.
pub fn clear(store: &Store, now: DateTime<Utc>) -> Result<ClearReport> {
    let actions_removed = store.ledger().purge_closed()?;
    let (feeder, uv) = store.schedules().clear_all()?;
    store.stock().set(0, now)?;
    info!(actions_removed, feeder, uv, "demo data cleared");
    Ok(ClearReport {
        actions_removed,
        feeder_schedules_removed: feeder,
        uv_schedules_removed: uv,
    })
}
