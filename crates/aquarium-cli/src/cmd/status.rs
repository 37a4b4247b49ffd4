use std::path::{Path, PathBuf};

use aquarium_core::types::{DeviceType, TriggerSource};
use chrono::Utc;

use crate::output::{print_json, print_table};

pub fn run(config_path: &Path, store: Option<&PathBuf>, json: bool) -> anyhow::Result<()> {
    let (config, store) = super::open_store(config_path, store)?;
    store.status().bootstrap(Utc::now())?;
    let offset = config.scheduler.utc_offset()?;

    let mut devices = Vec::new();
    for &device in DeviceType::all() {
        let row = store.status().get(device)?;
        let manual = store.ledger().find_open(device, Some(TriggerSource::Manual))?;
        devices.push((row, manual));
    }
    let stock = store.stock().get()?;

    if json {
        let list: Vec<serde_json::Value> = devices
            .iter()
            .map(|(row, manual)| {
                serde_json::json!({
                    "device_type": row.device_type,
                    "status": row.status,
                    "remaining_seconds": row.remaining_seconds,
                    "last_updated": row.last_updated,
                    "manual_active": manual.is_some(),
                    "manual_end_time": manual.as_ref().and_then(|m| m.end_time),
                })
            })
            .collect();
        return print_json(&serde_json::json!({ "devices": list, "stock": stock }));
    }

    let rows = devices
        .iter()
        .map(|(row, manual)| {
            vec![
                row.device_type.to_string(),
                row.status.to_string(),
                row.remaining_seconds.to_string(),
                if manual.is_some() { "yes" } else { "no" }.to_string(),
                row.last_updated
                    .with_timezone(&offset)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ]
        })
        .collect();
    print_table(&["DEVICE", "STATUS", "REMAINING", "MANUAL", "UPDATED"], rows);
    println!();
    println!("Stock: {} g", stock.amount_grams);
    Ok(())
}
