pub mod dashboard;
pub mod demo;
pub mod feeder;
pub mod history;
pub mod pagination;
pub mod sensors;
pub mod stock;
pub mod uv;

use aquarium_core::ledger::ActionRecord;
use aquarium_core::schedule::day_name;
use chrono::Datelike;

use crate::state::AppState;

/// Day, time and date of a record's start in local time.
pub(crate) fn local_stamp(app: &AppState, record: &ActionRecord) -> serde_json::Value {
    let local = app.local(record.start_time);
    serde_json::json!({
        "day": day_name::full(local.weekday()),
        "time": local.format("%H:%M").to_string(),
        "date": local.format("%Y-%m-%d").to_string(),
    })
}
