use std::path::{Path, PathBuf};

use aquarium_core::ledger::ActionFilter;

use crate::output::{print_json, print_table};

pub struct Filters {
    pub device: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    pub limit: usize,
}

impl Filters {
    fn to_filter(&self) -> anyhow::Result<ActionFilter> {
        Ok(ActionFilter {
            device_type: self.device.as_deref().map(str::parse).transpose()?,
            trigger_source: self.source.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
        })
    }
}

pub fn run(
    config_path: &Path,
    store: Option<&PathBuf>,
    filters: Filters,
    json: bool,
) -> anyhow::Result<()> {
    let filter = filters.to_filter()?;
    let (config, store) = super::open_store(config_path, store)?;
    let page = store.ledger().list(&filter, 0, filters.limit)?;

    if json {
        return print_json(&page);
    }
    if page.records.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }

    let offset = config.scheduler.utc_offset()?;
    let rows = page
        .records
        .iter()
        .map(|r| {
            vec![
                r.start_time
                    .with_timezone(&offset)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                r.device_type.to_string(),
                r.trigger_source.to_string(),
                r.status.to_string(),
                r.value.to_string(),
                r.id.to_string(),
            ]
        })
        .collect();
    print_table(&["START", "DEVICE", "SOURCE", "STATUS", "VALUE", "ID"], rows);
    if page.total > page.records.len() {
        println!("({} of {} shown)", page.records.len(), page.total);
    }
    Ok(())
}
