//! Feeder and UV schedule entries.
//!
//! The engine only reads active entries for the current day; everything else
//! here serves the HTTP CRUD surface and `aquariumd seed`.

use std::sync::Arc;

use chrono::{DateTime, Utc, Weekday};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{db_err, AquariumError, Result};
use crate::feed::DEFAULT_DOSE_GRAMS;
use crate::store::{FEEDER_SCHEDULES, UV_SCHEDULES};
use crate::window::{format_hhmm, parse_hhmm};

type Rows = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// Day names as full English words (`"Monday"`), parsed case-insensitively.
pub mod day_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn full(day: Weekday) -> &'static str {
        match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    pub fn serialize<S: Serializer>(day: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(full(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(d)?;
        raw.trim()
            .parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("unknown day name: {raw}")))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederSchedule {
    pub id: Uuid,
    #[serde(with = "day_name")]
    pub day_name: Weekday,
    /// `HH:MM`, local time.
    pub time: String,
    pub amount_grams: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvSchedule {
    pub id: Uuid,
    #[serde(with = "day_name")]
    pub day_name: Weekday,
    pub start_time: String,
    pub end_time: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeederScheduleInput {
    #[serde(with = "day_name")]
    pub day_name: Weekday,
    pub time: String,
    #[serde(default, alias = "amount_gram")]
    pub amount_grams: Option<u32>,
    #[serde(default, alias = "is_active")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UvScheduleInput {
    #[serde(with = "day_name")]
    pub day_name: Weekday,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, alias = "is_active")]
    pub active: Option<bool>,
}

trait Row: Serialize + DeserializeOwned {
    fn id(&self) -> Uuid;
    fn sort_key(&self) -> (u32, String);
}

impl Row for FeederSchedule {
    fn id(&self) -> Uuid {
        self.id
    }
    fn sort_key(&self) -> (u32, String) {
        (self.day_name.num_days_from_monday(), self.time.clone())
    }
}

impl Row for UvSchedule {
    fn id(&self) -> Uuid {
        self.id
    }
    fn sort_key(&self) -> (u32, String) {
        (self.day_name.num_days_from_monday(), self.start_time.clone())
    }
}

/// Validate and canonicalize an `HH:MM` field to zero-padded form.
fn canonical_time(value: &str) -> Result<String> {
    Ok(format_hhmm(parse_hhmm(value)?))
}

// ---------------------------------------------------------------------------
// ScheduleBook
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ScheduleBook {
    db: Arc<Database>,
}

impl ScheduleBook {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // -- feeder -------------------------------------------------------------

    pub fn create_feeder(
        &self,
        input: FeederScheduleInput,
        max_per_day: usize,
        now: DateTime<Utc>,
    ) -> Result<FeederSchedule> {
        let entry = FeederSchedule {
            id: Uuid::new_v4(),
            day_name: input.day_name,
            time: canonical_time(&input.time)?,
            amount_grams: input.amount_grams.unwrap_or(DEFAULT_DOSE_GRAMS),
            active: input.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        self.put_feeder(entry, max_per_day)
    }

    pub fn update_feeder(
        &self,
        id: Uuid,
        input: FeederScheduleInput,
        max_per_day: usize,
        now: DateTime<Utc>,
    ) -> Result<FeederSchedule> {
        let current = self.get_feeder(id)?;
        let entry = FeederSchedule {
            day_name: input.day_name,
            time: canonical_time(&input.time)?,
            amount_grams: input.amount_grams.unwrap_or(current.amount_grams),
            active: input.active.unwrap_or(current.active),
            updated_at: now,
            ..current
        };
        self.put_feeder(entry, max_per_day)
    }

    pub fn delete_feeder(&self, id: Uuid) -> Result<()> {
        self.delete(FEEDER_SCHEDULES, id)
    }

    pub fn get_feeder(&self, id: Uuid) -> Result<FeederSchedule> {
        self.get(FEEDER_SCHEDULES, id)
    }

    pub fn list_feeder(&self) -> Result<Vec<FeederSchedule>> {
        self.read_all(FEEDER_SCHEDULES)
    }

    pub fn list_active_feeder(&self, day: Weekday) -> Result<Vec<FeederSchedule>> {
        Ok(self
            .list_feeder()?
            .into_iter()
            .filter(|s| s.active && s.day_name == day)
            .collect())
    }

    /// Insert or replace `entry`, enforcing the active-per-day cap in the
    /// same write transaction.
    fn put_feeder(&self, entry: FeederSchedule, max_per_day: usize) -> Result<FeederSchedule> {
        let bytes = serde_json::to_vec(&entry)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(FEEDER_SCHEDULES).map_err(db_err)?;
            if entry.active {
                let mut same_day = 0usize;
                for row in table.iter().map_err(db_err)? {
                    let (_, v) = row.map_err(db_err)?;
                    let other: FeederSchedule = serde_json::from_slice(v.value())?;
                    if other.id != entry.id && other.active && other.day_name == entry.day_name {
                        same_day += 1;
                    }
                }
                if same_day >= max_per_day {
                    return Err(AquariumError::TooManySchedules { max: max_per_day });
                }
            }
            table
                .insert(entry.id.as_bytes().as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        info!(schedule_id = %entry.id, day = %entry.day_name, time = %entry.time, "feeder schedule saved");
        Ok(entry)
    }

    // -- uv -----------------------------------------------------------------

    pub fn create_uv(&self, input: UvScheduleInput, now: DateTime<Utc>) -> Result<UvSchedule> {
        let entry = UvSchedule {
            id: Uuid::new_v4(),
            day_name: input.day_name,
            start_time: canonical_time(&input.start_time)?,
            end_time: canonical_time(&input.end_time)?,
            active: input.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        self.put(UV_SCHEDULES, &entry)?;
        info!(schedule_id = %entry.id, day = %entry.day_name, start = %entry.start_time, end = %entry.end_time, "uv schedule saved");
        Ok(entry)
    }

    pub fn update_uv(
        &self,
        id: Uuid,
        input: UvScheduleInput,
        now: DateTime<Utc>,
    ) -> Result<UvSchedule> {
        let current = self.get_uv(id)?;
        let entry = UvSchedule {
            day_name: input.day_name,
            start_time: canonical_time(&input.start_time)?,
            end_time: canonical_time(&input.end_time)?,
            active: input.active.unwrap_or(current.active),
            updated_at: now,
            ..current
        };
        self.put(UV_SCHEDULES, &entry)?;
        Ok(entry)
    }

    pub fn delete_uv(&self, id: Uuid) -> Result<()> {
        self.delete(UV_SCHEDULES, id)
    }

    pub fn get_uv(&self, id: Uuid) -> Result<UvSchedule> {
        self.get(UV_SCHEDULES, id)
    }

    pub fn list_uv(&self) -> Result<Vec<UvSchedule>> {
        self.read_all(UV_SCHEDULES)
    }

    pub fn list_active_uv(&self, day: Weekday) -> Result<Vec<UvSchedule>> {
        Ok(self
            .list_uv()?
            .into_iter()
            .filter(|s| s.active && s.day_name == day)
            .collect())
    }

    // -- shared -------------------------------------------------------------

    fn put<T: Row>(&self, def: Rows, row: &T) -> Result<()> {
        let bytes = serde_json::to_vec(row)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(def).map_err(db_err)?;
            table
                .insert(row.id().as_bytes().as_slice(), bytes.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Remove every feeder and UV entry. Returns `(feeder, uv)` counts.
    pub fn clear_all(&self) -> Result<(usize, usize)> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let counts = (
            drain(&wt, FEEDER_SCHEDULES)?,
            drain(&wt, UV_SCHEDULES)?,
        );
        wt.commit().map_err(db_err)?;
        info!(feeder = counts.0, uv = counts.1, "schedules cleared");
        Ok(counts)
    }

    fn get<T: Row>(&self, def: Rows, id: Uuid) -> Result<T> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(def).map_err(db_err)?;
        match table.get(id.as_bytes().as_slice()).map_err(db_err)? {
            Some(g) => Ok(serde_json::from_slice(g.value())?),
            None => Err(AquariumError::ScheduleNotFound(id)),
        }
    }

    fn delete(&self, def: Rows, id: Uuid) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(def).map_err(db_err)?;
            let removed = table
                .remove(id.as_bytes().as_slice())
                .map_err(db_err)?
                .is_some();
            if !removed {
                return Err(AquariumError::ScheduleNotFound(id));
            }
        }
        wt.commit().map_err(db_err)?;
        info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }

    fn read_all<T: Row>(&self, def: Rows) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(def).map_err(db_err)?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            rows.push(serde_json::from_slice::<T>(v.value())?);
        }
        rows.sort_by_key(|r| r.sort_key());
        Ok(rows)
    }
}

fn drain(wt: &WriteTransaction, def: Rows) -> Result<usize> {
    let mut table = wt.open_table(def).map_err(db_err)?;
    let keys = table
        .iter()
        .map_err(db_err)?
        .map(|entry| entry.map(|(k, _)| k.value().to_vec()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    for key in &keys {
        table.remove(key.as_slice()).map_err(db_err)?;
    }
    Ok(keys.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
