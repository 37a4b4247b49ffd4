use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AquariumError;

// ---------------------------------------------------------------------------
// DeviceType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Feeder,
    Uv,
}

impl DeviceType {
    pub fn all() -> &'static [DeviceType] {
        &[DeviceType::Feeder, DeviceType::Uv]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Feeder => "FEEDER",
            DeviceType::Uv => "UV",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = AquariumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FEEDER" => Ok(DeviceType::Feeder),
            "UV" => Ok(DeviceType::Uv),
            _ => Err(AquariumError::Validation(format!("unknown device type: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    Schedule,
    Manual,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Schedule => "SCHEDULE",
            TriggerSource::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerSource {
    type Err = AquariumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULE" => Ok(TriggerSource::Schedule),
            "MANUAL" => Ok(TriggerSource::Manual),
            _ => Err(AquariumError::Validation(format!(
                "unknown trigger source: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action record.
///
/// Transitions: `Pending → Running → Success | Failed | Stopped | Overridden`,
/// plus `Pending → Failed` when dispatch fails. A completion report may close
/// a record straight from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Stopped,
    Overridden,
}

impl ActionStatus {
    /// Pending or Running: the record holds its device.
    pub fn is_open(self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Running => "RUNNING",
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
            ActionStatus::Stopped => "STOPPED",
            ActionStatus::Overridden => "OVERRIDDEN",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = AquariumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ActionStatus::Pending),
            "RUNNING" => Ok(ActionStatus::Running),
            "SUCCESS" => Ok(ActionStatus::Success),
            "FAILED" => Ok(ActionStatus::Failed),
            "STOPPED" => Ok(ActionStatus::Stopped),
            "OVERRIDDEN" => Ok(ActionStatus::Overridden),
            _ => Err(AquariumError::Validation(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceState
// ---------------------------------------------------------------------------

/// Physical state shown in the status mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Idle,
    Dispensing,
    On,
    Off,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Idle => "IDLE",
            DeviceState::Dispensing => "DISPENSING",
            DeviceState::On => "ON",
            DeviceState::Off => "OFF",
        }
    }

    /// Resting state a device is bootstrapped into.
    pub fn resting(device: DeviceType) -> Self {
        match device {
            DeviceType::Feeder => DeviceState::Idle,
            DeviceType::Uv => DeviceState::Off,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
