//! Cached device state for fast reads.
//!
//! Rows are written after dispatches and on device status messages. Nothing
//! in the control path reads them back; decisions go through the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::error::{db_err, AquariumError, Result};
use crate::store::DEVICE_STATUS;
use crate::types::{DeviceState, DeviceType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_type: DeviceType,
    pub status: DeviceState,
    pub remaining_seconds: u32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StatusMirror {
    db: Arc<Database>,
}

impl StatusMirror {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert the resting row for each device that has none yet.
    pub fn bootstrap(&self, now: DateTime<Utc>) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(DEVICE_STATUS).map_err(db_err)?;
            for device in DeviceType::all() {
                let exists = table.get(device.as_str()).map_err(db_err)?.is_some();
                if exists {
                    continue;
                }
                let row = DeviceStatus {
                    device_type: *device,
                    status: DeviceState::resting(*device),
                    remaining_seconds: 0,
                    last_updated: now,
                };
                let bytes = serde_json::to_vec(&row)?;
                table
                    .insert(device.as_str(), bytes.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Overwrite the row for `device`. Fails with `StatusMissing` before
    /// [`bootstrap`](Self::bootstrap) has created it.
    pub fn set(
        &self,
        device: DeviceType,
        status: DeviceState,
        remaining_seconds: u32,
        now: DateTime<Utc>,
    ) -> Result<DeviceStatus> {
        let row = DeviceStatus {
            device_type: device,
            status,
            remaining_seconds,
            last_updated: now,
        };
        let bytes = serde_json::to_vec(&row)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(DEVICE_STATUS).map_err(db_err)?;
            let exists = table.get(device.as_str()).map_err(db_err)?.is_some();
            if !exists {
                return Err(AquariumError::StatusMissing(device));
            }
            table
                .insert(device.as_str(), bytes.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(row)
    }

    pub fn get(&self, device: DeviceType) -> Result<DeviceStatus> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(DEVICE_STATUS).map_err(db_err)?;
        match table.get(device.as_str()).map_err(db_err)? {
            Some(g) => Ok(serde_json::from_slice(g.value())?),
            None => Err(AquariumError::StatusMissing(device)),
        }
    }
}
