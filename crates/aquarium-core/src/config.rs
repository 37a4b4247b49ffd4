use crate::error::{AquariumError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("aquarium.redb")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Simulated,
    Mqtt,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Simulated => "simulated",
            TransportMode::Mqtt => "mqtt",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportMode {
    type Err = AquariumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(TransportMode::Simulated),
            "mqtt" => Ok(TransportMode::Mqtt),
            _ => Err(AquariumError::Validation(format!(
                "unknown transport mode: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_broker() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "aquarium-backend".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_mqtt_port(),
            user: None,
            pass: None,
            client_id: default_client_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    #[serde(default = "default_report_delay_ms")]
    pub report_delay_ms: u64,
    /// Period of fake DHT readings. 0 turns them off.
    #[serde(default = "default_sensor_interval")]
    pub sensor_interval_secs: u64,
}

fn default_report_delay_ms() -> u64 {
    200
}

fn default_sensor_interval() -> u64 {
    300
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            report_delay_ms: default_report_delay_ms(),
            sensor_interval_secs: default_sensor_interval(),
        }
    }
}

impl SimulatedConfig {
    pub fn sensor_interval(&self) -> Option<Duration> {
        (self.sensor_interval_secs > 0).then(|| Duration::from_secs(self.sensor_interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

fn default_dispatch_timeout() -> u64 {
    5
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            mqtt: MqttConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

impl TransportConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_coarse_period")]
    pub coarse_period_secs: u64,
    #[serde(default = "default_fine_period")]
    pub fine_period_secs: u64,
    #[serde(default = "default_align")]
    pub align_to_minute: bool,
    /// Trailing window in which an existing feeder schedule record
    /// suppresses a repeat trigger. Independent of the coarse period.
    #[serde(default = "default_dedupe_window")]
    pub feeder_dedupe_window_secs: u64,
    /// Local time zone for day names and `HH:MM` schedule times.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_recovery_max_age")]
    pub recovery_max_age_secs: u64,
}

fn default_coarse_period() -> u64 {
    60
}

fn default_fine_period() -> u64 {
    10
}

fn default_align() -> bool {
    true
}

fn default_dedupe_window() -> u64 {
    60
}

fn default_utc_offset() -> i32 {
    7 * 60
}

fn default_recovery_max_age() -> u64 {
    120
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            coarse_period_secs: default_coarse_period(),
            fine_period_secs: default_fine_period(),
            align_to_minute: default_align(),
            feeder_dedupe_window_secs: default_dedupe_window(),
            utc_offset_minutes: default_utc_offset(),
            recovery_max_age_secs: default_recovery_max_age(),
        }
    }
}

impl SchedulerConfig {
    pub fn coarse_period(&self) -> Duration {
        Duration::from_secs(self.coarse_period_secs.max(1))
    }

    pub fn fine_period(&self) -> Duration {
        Duration::from_secs(self.fine_period_secs.max(1))
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.feeder_dedupe_window_secs)
    }

    pub fn recovery_max_age(&self) -> Duration {
        Duration::from_secs(self.recovery_max_age_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            AquariumError::Validation(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// FeederConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederConfig {
    #[serde(default = "default_dose_grams")]
    pub dose_grams: u32,
    #[serde(default = "default_max_schedules")]
    pub max_schedules_per_day: usize,
}

fn default_dose_grams() -> u32 {
    crate::feed::DEFAULT_DOSE_GRAMS
}

fn default_max_schedules() -> usize {
    5
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            dose_grams: default_dose_grams(),
            max_schedules_per_day: default_max_schedules(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub feeder: FeederConfig,
}

impl Config {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let s = &self.scheduler;

        if s.coarse_period_secs == 0 {
            warnings.push(ConfigWarning::error("scheduler.coarse_period_secs must be > 0"));
        }
        if s.fine_period_secs == 0 {
            warnings.push(ConfigWarning::error("scheduler.fine_period_secs must be > 0"));
        }
        if s.fine_period_secs >= s.coarse_period_secs && s.coarse_period_secs > 0 {
            warnings.push(ConfigWarning::warning(format!(
                "scheduler.fine_period_secs ({}) is not shorter than coarse_period_secs ({}); \
                 manual UV expiry will lag",
                s.fine_period_secs, s.coarse_period_secs
            )));
        }
        if s.coarse_period_secs > s.feeder_dedupe_window_secs {
            warnings.push(ConfigWarning::warning(format!(
                "scheduler.coarse_period_secs ({}) exceeds feeder_dedupe_window_secs ({})",
                s.coarse_period_secs, s.feeder_dedupe_window_secs
            )));
        }
        if s.utc_offset_minutes.abs() > 14 * 60 {
            warnings.push(ConfigWarning::error(format!(
                "scheduler.utc_offset_minutes out of range: {}",
                s.utc_offset_minutes
            )));
        }
        if self.feeder.dose_grams == 0 {
            warnings.push(ConfigWarning::error("feeder.dose_grams must be > 0"));
        }
        if self.feeder.max_schedules_per_day == 0 {
            warnings.push(ConfigWarning::warning(
                "feeder.max_schedules_per_day is 0; no feeder schedule can be active",
            ));
        }
        if self.transport.dispatch_timeout_secs == 0 {
            warnings.push(ConfigWarning::error(
                "transport.dispatch_timeout_secs must be > 0",
            ));
        }
        if self.transport.mode == TransportMode::Mqtt && self.transport.mqtt.broker.trim().is_empty()
        {
            warnings.push(ConfigWarning::error(
                "transport.mqtt.broker is empty in mqtt mode",
            ));
        }
        if self.transport.mqtt.user.is_some() != self.transport.mqtt.pass.is_some() {
            warnings.push(ConfigWarning::warning(
                "transport.mqtt.user and pass should be set together",
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.transport.mode, TransportMode::Simulated);
        assert_eq!(cfg.scheduler.coarse_period_secs, 60);
        assert_eq!(cfg.scheduler.fine_period_secs, 10);
        assert_eq!(cfg.feeder.dose_grams, 10);
        assert_eq!(
            cfg.transport.simulated.sensor_interval(),
            Some(Duration::from_secs(300))
        );
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn zero_sensor_interval_disables_feed() {
        let yaml = "transport:
  simulated:
    sensor_interval_secs: 0
";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.transport.simulated.sensor_interval(), None);
        assert_eq!(cfg.transport.simulated.report_delay_ms, 200);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "transport:\n  mode: mqtt\n  mqtt:\n    broker: broker.local\nscheduler:\n  fine_period_secs: 5\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.transport.mode, TransportMode::Mqtt);
        assert_eq!(cfg.transport.mqtt.broker, "broker.local");
        assert_eq!(cfg.transport.mqtt.port, 1883);
        assert_eq!(cfg.transport.mqtt.client_id, "aquarium-backend");
        assert_eq!(cfg.scheduler.fine_period_secs, 5);
        assert_eq!(cfg.scheduler.coarse_period_secs, 60);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aquarium.yaml");
        let mut cfg = Config::default();
        cfg.server.port = 9001;
        cfg.scheduler.utc_offset_minutes = 0;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 9001);
        assert_eq!(loaded.scheduler.utc_offset_minutes, 0);
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::default();
        cfg.scheduler.fine_period_secs = 0;
        cfg.feeder.dose_grams = 0;
        cfg.scheduler.utc_offset_minutes = 15 * 60;
        cfg.transport.mode = TransportMode::Mqtt;
        cfg.transport.mqtt.broker = String::new();
        let errors: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn validate_warns_when_fine_not_faster() {
        let mut cfg = Config::default();
        cfg.scheduler.fine_period_secs = 60;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }

    #[test]
    fn utc_offset_converts() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.utc_offset().unwrap().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn transport_mode_parses() {
        assert_eq!("MQTT".parse::<TransportMode>().unwrap(), TransportMode::Mqtt);
        assert!("zigbee".parse::<TransportMode>().is_err());
    }
}
