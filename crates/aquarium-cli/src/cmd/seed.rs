use std::path::{Path, PathBuf};

use aquarium_core::demo;
use chrono::Utc;

use crate::output::print_json;

pub fn run(config_path: &Path, store: Option<&PathBuf>, clear: bool, json: bool) -> anyhow::Result<()> {
    let (config, store) = super::open_store(config_path, store)?;
    let now = Utc::now();

    if clear {
        let report = demo::clear(&store, now)?;
        if json {
            return print_json(&report);
        }
        println!(
            "Removed {} actions, {} feeder schedules, {} uv schedules; stock set to 0 g",
            report.actions_removed, report.feeder_schedules_removed, report.uv_schedules_removed
        );
        return Ok(());
    }

    let report = demo::seed(
        &store,
        config.feeder.dose_grams,
        config.feeder.max_schedules_per_day,
        now,
    )?;
    if json {
        return print_json(&report);
    }
    println!(
        "Seeded {} feeder schedules, {} uv schedules",
        report.feeder_schedules, report.uv_schedules
    );
    match report.stock_grams {
        Some(g) => println!("Stock set to {g} g"),
        None => println!("Stock already set, left unchanged"),
    }
    Ok(())
}
