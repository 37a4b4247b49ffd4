//! Scheduling and reconciliation engine.
//!
//! Every actuation follows the same bracket: `open_pending` in the ledger,
//! then `send` through the dispatcher, then `mark_running` or `mark_failed`.
//! The ledger write commits before the send starts and no store transaction
//! is held across the send, so a concurrent writer sees the claim and backs
//! off with a conflict instead of dispatching twice.

mod manual;
mod reports;
mod ticks;

pub use manual::{DeviceStatusView, ManualFeed, ManualUv, StoppedUv};
pub use ticks::{TickOutcome, TickSummary};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::{Clock, LocalMoment};
use crate::config::Config;
use crate::dispatch::{Command, Dispatcher};
use crate::error::{AquariumError, Result};
use crate::ledger::{ActionRecord, NewAction};
use crate::scheduler::SingleFlight;
use crate::store::Store;
use crate::types::{DeviceState, DeviceType};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub dose_grams: u32,
    pub feeder_dedupe_window: Duration,
    pub utc_offset: FixedOffset,
    pub recovery_max_age: Duration,
    pub max_feeder_schedules_per_day: usize,
}

impl EngineSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            dose_grams: cfg.feeder.dose_grams.max(1),
            feeder_dedupe_window: cfg.scheduler.dedupe_window(),
            utc_offset: cfg.scheduler.utc_offset()?,
            recovery_max_age: cfg.scheduler.recovery_max_age(),
            max_feeder_schedules_per_day: cfg.feeder.max_schedules_per_day,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let cfg = Config::default();
        Self {
            dose_grams: cfg.feeder.dose_grams,
            feeder_dedupe_window: cfg.scheduler.dedupe_window(),
            utc_offset: cfg.scheduler.utc_offset().unwrap_or(Utc.fix()),
            recovery_max_age: cfg.scheduler.recovery_max_age(),
            max_feeder_schedules_per_day: cfg.feeder.max_schedules_per_day,
        }
    }
}

pub struct Engine {
    store: Store,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    coarse_guard: SingleFlight,
    fine_guard: SingleFlight,
}

impl Engine {
    pub fn new(
        store: Store,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            settings,
            coarse_guard: SingleFlight::new(),
            fine_guard: SingleFlight::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn local_now(&self) -> LocalMoment {
        LocalMoment::at(self.now(), self.settings.utc_offset)
    }

    /// Create missing status rows and fail stale pending records.
    ///
    /// Returns the number of recovered records.
    pub async fn bootstrap(&self) -> Result<u32> {
        let now = self.now();
        let max_age = self.settings.recovery_max_age;
        self.db(move |s| {
            s.status().bootstrap(now)?;
            s.ledger().startup_recovery(max_age, now)
        })
        .await
    }

    /// Run a synchronous store operation off the async runtime.
    pub async fn db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AquariumError::Join(e.to_string()))?
    }

    /// Best-effort status mirror write. Failures are logged, never returned.
    async fn mirror(&self, device: DeviceType, state: DeviceState, remaining_seconds: u32) {
        let now = self.now();
        let written = self
            .db(move |s| s.status().set(device, state, remaining_seconds, now))
            .await;
        if let Err(e) = written {
            warn!(device = %device, state = %state, error = %e, "status mirror not updated");
        }
    }

    /// Claim the device, send `command`, and record the dispatch result.
    ///
    /// Returns the record as it stands afterwards: normally `Running`, or
    /// already terminal if the device report beat `mark_running`.
    async fn dispatch_new(&self, new: NewAction, command: Command) -> Result<ActionRecord> {
        let now = self.now();
        let record = self.db(move |s| s.ledger().open_pending(new, now)).await?;
        self.dispatch_claimed(record.id, command).await
    }

    /// Send `command` for the already-claimed `Pending` record `id`.
    async fn dispatch_claimed(&self, id: Uuid, command: Command) -> Result<ActionRecord> {
        if let Err(dispatch_err) = self.dispatcher.send(command).await {
            let now = self.now();
            if let Err(e) = self.db(move |s| s.ledger().mark_failed(id, now)).await {
                error!(action_id = %id, error = %e, "could not mark action failed");
            }
            return Err(dispatch_err.into());
        }

        let now = self.now();
        match self.db(move |s| s.ledger().mark_running(id, now)).await? {
            Some(running) => Ok(running),
            None => self.db(move |s| s.ledger().get(id)).await,
        }
    }
}
