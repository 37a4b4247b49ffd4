use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::types::{ActionStatus, DeviceType};

/// Failure to get a command to the device. Never retried by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum AquariumError {
    #[error("{device} already has an open action ({action_id})")]
    Conflict { device: DeviceType, action_id: Uuid },

    #[error("action not found: {0}")]
    ActionNotFound(Uuid),

    #[error("no running {0} action")]
    NoRunningAction(DeviceType),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("invalid transition for action {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("malformed schedule time '{value}': {reason}")]
    MalformedScheduleEntry { value: String, reason: String },

    #[error("maximum {max} active feeder schedules per day")]
    TooManySchedules { max: usize },

    #[error("malformed report on '{topic}': {reason}")]
    ReportParse { topic: String, reason: String },

    #[error("device status row missing for {0}")]
    StatusMissing(DeviceType),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("store error: {0}")]
    Store(String),

    #[error("background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AquariumError {
    /// An open record already exists; callers treat this as "skip".
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, AquariumError>;

/// Map any redb error into [`AquariumError::Store`].
pub(crate) fn db_err(e: impl std::fmt::Display) -> AquariumError {
    AquariumError::Store(e.to_string())
}
