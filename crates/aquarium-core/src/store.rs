//! Single redb file backing the ledger, status mirror, schedule book and stock.
//!
//! # Table design
//!
//! ```text
//! actions          [ start_ms: u64 BE | uuid: 16 bytes ] -> JSON ActionRecord
//! action_keys      uuid bytes                            -> actions key
//! open_actions     "FEEDER" | "UV"                       -> actions key
//! device_status    "FEEDER" | "UV"                       -> JSON DeviceStatus
//! feeder_schedules uuid bytes                            -> JSON FeederSchedule
//! uv_schedules     uuid bytes                            -> JSON UvSchedule
//! stock            "stock"                               -> JSON StockLevel
//! sensor_log       [ recorded_ms: u64 BE | uuid ]        -> JSON SensorReading
//! ```
//!
//! `open_actions` holds at most one entry per device type. Every transition
//! that opens or closes a record touches it in the same write transaction.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, TableDefinition};
use uuid::Uuid;

use crate::error::{db_err, Result};
use crate::ledger::Ledger;
use crate::schedule::ScheduleBook;
use crate::sensor::SensorLog;
use crate::status::StatusMirror;
use crate::stock::StockDb;

pub(crate) const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
pub(crate) const ACTION_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("action_keys");
pub(crate) const OPEN_ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("open_actions");
pub(crate) const DEVICE_STATUS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("device_status");
pub(crate) const FEEDER_SCHEDULES: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("feeder_schedules");
pub(crate) const UV_SCHEDULES: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("uv_schedules");
pub(crate) const STOCK: TableDefinition<&str, &[u8]> = TableDefinition::new("stock");
pub(crate) const SENSOR_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sensor_log");

/// Key that sorts by `ts`, then by `id`.
pub(crate) fn time_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Bounds covering every key whose timestamp falls in `[from, to]`.
pub(crate) fn time_bounds(from: DateTime<Utc>, to: DateTime<Utc>) -> ([u8; 24], [u8; 24]) {
    let lower = time_key(from, Uuid::nil());
    let mut upper = time_key(to, Uuid::nil());
    upper[8..].fill(0xff);
    (lower, upper)
}

/// Shared handle to the controller database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at `path` and make sure every table exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ACTIONS).map_err(db_err)?;
        wt.open_table(ACTION_KEYS).map_err(db_err)?;
        wt.open_table(OPEN_ACTIONS).map_err(db_err)?;
        wt.open_table(DEVICE_STATUS).map_err(db_err)?;
        wt.open_table(FEEDER_SCHEDULES).map_err(db_err)?;
        wt.open_table(UV_SCHEDULES).map_err(db_err)?;
        wt.open_table(STOCK).map_err(db_err)?;
        wt.open_table(SENSOR_LOG).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.db.clone())
    }

    pub fn status(&self) -> StatusMirror {
        StatusMirror::new(self.db.clone())
    }

    pub fn schedules(&self) -> ScheduleBook {
        ScheduleBook::new(self.db.clone())
    }

    pub fn stock(&self) -> StockDb {
        StockDb::new(self.db.clone())
    }

    pub fn sensors(&self) -> SensorLog {
        SensorLog::new(self.db.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::open_tmp;
    use super::Store;

    #[test]
    fn reopen_keeps_tables() {
        let (dir, store) = open_tmp();
        drop(store);
        let reopened = Store::open(&dir.path().join("test.redb"));
        assert!(reopened.is_ok());
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/data/aquarium.redb");
        Store::open(&path).unwrap();
        assert!(path.exists());
    }
}
