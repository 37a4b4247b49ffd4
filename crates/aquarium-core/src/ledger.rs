//! Durable action ledger.
//!
//! An `ActionRecord` is one attempted actuation of a device. The ledger is the
//! only authority on "what is currently happening" per device type: at most
//! one record per device may be `Pending` or `Running` at any instant, and
//! `open_pending` is the single place that claims a device.
//!
//! Every transition runs its read-check-write inside one redb write
//! transaction, so concurrent writers (ticks, manual requests, device reports)
//! observe each other's claims without holding any lock across dispatch I/O.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{db_err, AquariumError, Result};
use crate::store::{time_bounds, time_key, ACTIONS, ACTION_KEYS, OPEN_ACTIONS};
use crate::types::{ActionStatus, DeviceType, TriggerSource};

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub device_type: DeviceType,
    pub trigger_source: TriggerSource,
    pub start_time: DateTime<Utc>,
    /// Planned end for UV records, actual end once terminal.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ActionStatus,
    /// Grams for the feeder, seconds for UV.
    pub value: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionRecord {
    /// True once `now` is strictly past the planned end.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| now > end)
    }
}

/// Parameters for [`Ledger::open_pending`].
#[derive(Debug, Clone)]
pub struct NewAction {
    pub device_type: DeviceType,
    pub trigger_source: TriggerSource,
    pub value: u32,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub device_type: Option<DeviceType>,
    pub trigger_source: Option<TriggerSource>,
    pub status: Option<ActionStatus>,
}

impl ActionFilter {
    fn matches(&self, r: &ActionRecord) -> bool {
        self.device_type.is_none_or(|d| d == r.device_type)
            && self.trigger_source.is_none_or(|s| s == r.trigger_source)
            && self.status.is_none_or(|s| s == r.status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionPage {
    pub records: Vec<ActionRecord>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn id_from_key(key: &[u8]) -> Uuid {
    Uuid::from_slice(&key[8..]).unwrap_or_else(|_| Uuid::nil())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Claim `device_type` with a new `Pending` record.
    ///
    /// Fails with [`AquariumError::Conflict`] when the device already has an
    /// open record. The check and the insert commit atomically.
    pub fn open_pending(&self, new: NewAction, now: DateTime<Utc>) -> Result<ActionRecord> {
        self.claim(new, None, now)
    }

    /// Close the open record `current` as `Overridden` and claim its device
    /// with a new `Pending` record, in one write transaction.
    ///
    /// If `current` was already closed the device is claimed as by
    /// [`Ledger::open_pending`]. Any other holder is a conflict and nothing
    /// is written.
    pub fn supersede(
        &self,
        current: Uuid,
        new: NewAction,
        now: DateTime<Utc>,
    ) -> Result<ActionRecord> {
        self.claim(new, Some(current), now)
    }

    fn claim(
        &self,
        new: NewAction,
        replace: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ActionRecord> {
        let record = ActionRecord {
            id: Uuid::new_v4(),
            device_type: new.device_type,
            trigger_source: new.trigger_source,
            start_time: now,
            end_time: new.end_time,
            status: ActionStatus::Pending,
            value: new.value,
            created_at: now,
            updated_at: now,
        };
        let key = time_key(record.start_time, record.id);
        let value = serde_json::to_vec(&record)?;
        let device = record.device_type.as_str();

        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut open = wt.open_table(OPEN_ACTIONS).map_err(db_err)?;
            let holder_key = open
                .get(device)
                .map_err(db_err)?
                .map(|g| g.value().to_vec());
            let mut actions = wt.open_table(ACTIONS).map_err(db_err)?;
            if let Some(holder_key) = holder_key {
                let holder = id_from_key(&holder_key);
                if replace != Some(holder) {
                    return Err(AquariumError::Conflict {
                        device: record.device_type,
                        action_id: holder,
                    });
                }
                let mut previous: ActionRecord =
                    match actions.get(holder_key.as_slice()).map_err(db_err)? {
                        Some(g) => serde_json::from_slice(g.value())?,
                        None => return Err(AquariumError::ActionNotFound(holder)),
                    };
                let from = previous.status;
                previous.status = ActionStatus::Overridden;
                previous.end_time = Some(now);
                previous.updated_at = now;
                let previous_value = serde_json::to_vec(&previous)?;
                actions
                    .insert(holder_key.as_slice(), previous_value.as_slice())
                    .map_err(db_err)?;
                info!(
                    action_id = %holder,
                    device = %record.device_type,
                    from = %from,
                    to = %previous.status,
                    "action transitioned"
                );
            }
            actions
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
            let mut keys = wt.open_table(ACTION_KEYS).map_err(db_err)?;
            keys.insert(record.id.as_bytes().as_slice(), key.as_slice())
                .map_err(db_err)?;
            open.insert(device, key.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;

        info!(
            action_id = %record.id,
            device = %record.device_type,
            source = %record.trigger_source,
            value = record.value,
            "action opened"
        );
        Ok(record)
    }

    /// `Pending → Running` after a successful dispatch.
    ///
    /// Returns `Ok(None)` when a completion report already closed the record.
    pub fn mark_running(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<ActionRecord>> {
        self.transition(id, |current| match current.status {
            ActionStatus::Pending => {
                let mut next = current.clone();
                next.status = ActionStatus::Running;
                next.updated_at = now;
                Ok(Some(next))
            }
            s if s.is_terminal() => Ok(None),
            from => Err(AquariumError::InvalidTransition {
                id,
                from,
                to: ActionStatus::Running,
            }),
        })
    }

    /// `Pending → Failed` after a failed dispatch.
    pub fn mark_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<ActionRecord>> {
        self.transition(id, |current| match current.status {
            ActionStatus::Pending => {
                let mut next = current.clone();
                next.status = ActionStatus::Failed;
                next.end_time = Some(now);
                next.updated_at = now;
                Ok(Some(next))
            }
            s if s.is_terminal() => Ok(None),
            from => Err(AquariumError::InvalidTransition {
                id,
                from,
                to: ActionStatus::Failed,
            }),
        })
    }

    /// Move an open record to a terminal `status`, releasing its device.
    ///
    /// Only acts while the record is still open; returns `Ok(None)` if some
    /// other writer already closed it.
    pub fn close(
        &self,
        id: Uuid,
        status: ActionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<ActionRecord>> {
        self.transition(id, |current| {
            if status.is_open() {
                return Err(AquariumError::InvalidTransition {
                    id,
                    from: current.status,
                    to: status,
                });
            }
            if current.status.is_terminal() {
                return Ok(None);
            }
            let mut next = current.clone();
            next.status = status;
            next.end_time = Some(end_time);
            next.updated_at = end_time;
            Ok(Some(next))
        })
    }

    /// The open record for `device_type`, optionally restricted to one source.
    pub fn find_open(
        &self,
        device_type: DeviceType,
        source: Option<TriggerSource>,
    ) -> Result<Option<ActionRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let open = rt.open_table(OPEN_ACTIONS).map_err(db_err)?;
        let Some(key) = open
            .get(device_type.as_str())
            .map_err(db_err)?
            .map(|g| g.value().to_vec())
        else {
            return Ok(None);
        };
        let actions = rt.open_table(ACTIONS).map_err(db_err)?;
        let record = match actions.get(key.as_slice()).map_err(db_err)? {
            Some(g) => serde_json::from_slice::<ActionRecord>(g.value())?,
            None => return Ok(None),
        };
        if source.is_some_and(|s| s != record.trigger_source) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Newest record of any status for `device_type`/`source` that started
    /// within `[since, until]`.
    pub fn find_recent(
        &self,
        device_type: DeviceType,
        source: TriggerSource,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<ActionRecord>> {
        if since > until {
            return Ok(None);
        }
        let (lower, upper) = time_bounds(since, until);
        let rt = self.db.begin_read().map_err(db_err)?;
        let actions = rt.open_table(ACTIONS).map_err(db_err)?;
        for entry in actions
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(db_err)?
            .rev()
        {
            let (_, v) = entry.map_err(db_err)?;
            let record: ActionRecord = serde_json::from_slice(v.value())?;
            if record.device_type == device_type && record.trigger_source == source {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn get(&self, id: Uuid) -> Result<ActionRecord> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let keys = rt.open_table(ACTION_KEYS).map_err(db_err)?;
        let key = keys
            .get(id.as_bytes().as_slice())
            .map_err(db_err)?
            .map(|g| g.value().to_vec())
            .ok_or(AquariumError::ActionNotFound(id))?;
        let actions = rt.open_table(ACTIONS).map_err(db_err)?;
        let record = match actions.get(key.as_slice()).map_err(db_err)? {
            Some(g) => serde_json::from_slice(g.value())?,
            None => return Err(AquariumError::ActionNotFound(id)),
        };
        Ok(record)
    }

    /// Records matching `filter`, newest start first, skipping `offset` and
    /// returning at most `limit`. `total` counts every match.
    pub fn list(&self, filter: &ActionFilter, offset: usize, limit: usize) -> Result<ActionPage> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let actions = rt.open_table(ACTIONS).map_err(db_err)?;
        let mut records = Vec::new();
        let mut total = 0usize;
        for entry in actions.iter().map_err(db_err)?.rev() {
            let (_, v) = entry.map_err(db_err)?;
            let record: ActionRecord = serde_json::from_slice(v.value())?;
            if !filter.matches(&record) {
                continue;
            }
            if total >= offset && records.len() < limit {
                records.push(record);
            }
            total += 1;
        }
        Ok(ActionPage { records, total })
    }

    /// Most recent `Success` record for `device_type`.
    pub fn last_success(&self, device_type: DeviceType) -> Result<Option<ActionRecord>> {
        let filter = ActionFilter {
            device_type: Some(device_type),
            status: Some(ActionStatus::Success),
            ..Default::default()
        };
        Ok(self.list(&filter, 0, 1)?.records.into_iter().next())
    }

    /// Delete every terminal record. Open records stay, so device claims
    /// survive. Returns the number deleted.
    pub fn purge_closed(&self) -> Result<usize> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut actions = wt.open_table(ACTIONS).map_err(db_err)?;
            let mut keys = wt.open_table(ACTION_KEYS).map_err(db_err)?;
            let mut closed = Vec::new();
            for entry in actions.iter().map_err(db_err)? {
                let (k, v) = entry.map_err(db_err)?;
                let record: ActionRecord = serde_json::from_slice(v.value())?;
                if record.status.is_terminal() {
                    closed.push((k.value().to_vec(), record.id));
                }
            }
            for (key, id) in &closed {
                actions.remove(key.as_slice()).map_err(db_err)?;
                keys.remove(id.as_bytes().as_slice()).map_err(db_err)?;
            }
            closed.len()
        };
        wt.commit().map_err(db_err)?;
        info!(removed, "closed actions purged");
        Ok(removed)
    }

    /// On startup, fail any `Pending` record older than `max_age`.
    ///
    /// Such a record was opened but the process died before the dispatch
    /// result was written. `Running` records are left for the ticks to expire.
    /// Returns the number of records recovered.
    pub fn startup_recovery(&self, max_age: Duration, now: DateTime<Utc>) -> Result<u32> {
        let cutoff = now
            - chrono::Duration::from_std(max_age).map_err(|e| AquariumError::Store(e.to_string()))?;

        let stale: Vec<Uuid> = DeviceType::all()
            .iter()
            .map(|d| self.find_open(*d, None))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .filter(|r| r.status == ActionStatus::Pending && r.updated_at < cutoff)
            .map(|r| r.id)
            .collect();

        let mut count = 0u32;
        for id in stale {
            if self.mark_failed(id, now)?.is_some() {
                info!(action_id = %id, "recovered stale pending action");
                count += 1;
            }
        }
        Ok(count)
    }

    /// Read-check-write of one record inside a single write transaction.
    ///
    /// `step` returns the replacement record, or `None` to leave it as is.
    /// A replacement with a terminal status also releases the device.
    fn transition<F>(&self, id: Uuid, step: F) -> Result<Option<ActionRecord>>
    where
        F: FnOnce(&ActionRecord) -> Result<Option<ActionRecord>>,
    {
        let wt = self.db.begin_write().map_err(db_err)?;
        let outcome = {
            let keys = wt.open_table(ACTION_KEYS).map_err(db_err)?;
            let key = keys
                .get(id.as_bytes().as_slice())
                .map_err(db_err)?
                .map(|g| g.value().to_vec())
                .ok_or(AquariumError::ActionNotFound(id))?;
            let mut actions = wt.open_table(ACTIONS).map_err(db_err)?;
            let current: ActionRecord = match actions.get(key.as_slice()).map_err(db_err)? {
                Some(g) => serde_json::from_slice(g.value())?,
                None => return Err(AquariumError::ActionNotFound(id)),
            };

            match step(&current)? {
                None => {
                    debug!(action_id = %id, status = %current.status, "transition skipped");
                    None
                }
                Some(next) => {
                    let value = serde_json::to_vec(&next)?;
                    actions
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(db_err)?;
                    if next.status.is_terminal() {
                        let mut open = wt.open_table(OPEN_ACTIONS).map_err(db_err)?;
                        let device = next.device_type.as_str();
                        let holds_device = open
                            .get(device)
                            .map_err(db_err)?
                            .is_some_and(|g| g.value() == key.as_slice());
                        if holds_device {
                            open.remove(device).map_err(db_err)?;
                        }
                    }
                    info!(
                        action_id = %id,
                        device = %next.device_type,
                        from = %current.status,
                        to = %next.status,
                        "action transitioned"
                    );
                    Some(next)
                }
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
