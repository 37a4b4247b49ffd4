use std::sync::Arc;

use aquarium_core::Engine;
use chrono::{DateTime, FixedOffset, Utc};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// `ts` in the controller's local time zone.
    pub fn local(&self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        ts.with_timezone(&self.engine.settings().utc_offset)
    }
}
