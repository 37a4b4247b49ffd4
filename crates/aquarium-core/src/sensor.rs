//! Temperature and humidity readings from the tank's DHT sensor.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{db_err, AquariumError, Result};
use crate::store::{time_key, SENSOR_LOG};

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -40.0..=80.0;
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: Uuid,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorPage {
    pub records: Vec<SensorReading>,
    pub total: usize,
}

/// Reject values outside what the sensor can report.
pub fn validate_reading(temperature: f64, humidity: f64) -> Result<()> {
    if !TEMPERATURE_RANGE.contains(&temperature) {
        return Err(AquariumError::Validation(format!(
            "temperature must be between {} and {}, got {temperature}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end()
        )));
    }
    if !HUMIDITY_RANGE.contains(&humidity) {
        return Err(AquariumError::Validation(format!(
            "humidity must be between {} and {}, got {humidity}",
            HUMIDITY_RANGE.start(),
            HUMIDITY_RANGE.end()
        )));
    }
    Ok(())
}

/// Append-only log of readings, keyed by time.
#[derive(Clone)]
pub struct SensorLog {
    db: Arc<Database>,
}

impl SensorLog {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn record(
        &self,
        temperature: f64,
        humidity: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<SensorReading> {
        validate_reading(temperature, humidity)?;
        let reading = SensorReading {
            id: Uuid::new_v4(),
            temperature,
            humidity,
            recorded_at,
        };
        let key = time_key(recorded_at, reading.id);
        let value = serde_json::to_vec(&reading)?;

        let wt = self.db.begin_write().map_err(db_err)?;
        wt.open_table(SENSOR_LOG)
            .map_err(db_err)?
            .insert(key.as_slice(), value.as_slice())
            .map_err(db_err)?;
        wt.commit().map_err(db_err)?;

        debug!(temperature, humidity, "sensor reading recorded");
        Ok(reading)
    }

    pub fn latest(&self) -> Result<Option<SensorReading>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(SENSOR_LOG).map_err(db_err)?;
        let result = match table.last().map_err(db_err)? {
            Some((_, v)) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        };
        result
    }

    /// Readings at or after `since`, newest first.
    pub fn list(
        &self,
        since: Option<DateTime<Utc>>,
        offset: usize,
        limit: usize,
    ) -> Result<SensorPage> {
        let lower = since.map_or([0u8; 24], |t| time_key(t, Uuid::nil()));
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(SENSOR_LOG).map_err(db_err)?;
        let mut records = Vec::new();
        let mut total = 0usize;
        for entry in table.range(lower.as_slice()..).map_err(db_err)?.rev() {
            let (_, v) = entry.map_err(db_err)?;
            if total >= offset && records.len() < limit {
                records.push(serde_json::from_slice(v.value())?);
            }
            total += 1;
        }
        Ok(SensorPage { records, total })
    }
}
