//! JSON wire format shared by the MQTT and simulated transports.

use serde::{Deserialize, Serialize};

use crate::dispatch::{Command, UvState};
use crate::error::{AquariumError, DispatchError, Result};
use crate::types::{DeviceState, DeviceType};

pub const FEEDER_COMMAND_TOPIC: &str = "aquarium/feeder/command";
pub const UV_COMMAND_TOPIC: &str = "aquarium/uv/command";
pub const DEVICE_REPORT_TOPIC: &str = "aquarium/device/report";
pub const FEEDER_STATUS_TOPIC: &str = "aquarium/feeder/status";
pub const UV_STATUS_TOPIC: &str = "aquarium/uv/status";
pub const SENSOR_TOPIC: &str = "aquarium/sensor/dht";

/// Topics the controller subscribes to.
pub const INBOUND_TOPICS: [&str; 4] = [
    DEVICE_REPORT_TOPIC,
    FEEDER_STATUS_TOPIC,
    UV_STATUS_TOPIC,
    SENSOR_TOPIC,
];

/// Raw message from a device, real or simulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    pub fn json<T: Serialize>(topic: &str, body: &T) -> Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(body)?))
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCommandPayload {
    pub action: String,
    pub dose: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvCommandPayload {
    pub state: UvState,
    pub duration_sec: u32,
}

/// Topic and JSON body for `command`.
pub fn encode_command(command: &Command) -> std::result::Result<(&'static str, Vec<u8>), DispatchError> {
    let (topic, body) = match command {
        Command::Feed { doses } => (
            FEEDER_COMMAND_TOPIC,
            serde_json::to_vec(&FeedCommandPayload {
                action: "FEED".to_string(),
                dose: *doses,
            }),
        ),
        Command::Uv {
            state,
            duration_secs,
        } => (
            UV_COMMAND_TOPIC,
            serde_json::to_vec(&UvCommandPayload {
                state: *state,
                duration_sec: *duration_secs,
            }),
        ),
    };
    Ok((topic, body.map_err(|e| DispatchError::Protocol(e.to_string()))?))
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportResult {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    Feed,
    Uv,
}

impl ReportKind {
    pub fn device(self) -> DeviceType {
        match self {
            ReportKind::Feed => DeviceType::Feeder,
            ReportKind::Uv => DeviceType::Uv,
        }
    }
}

/// Completion report for one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub result: ReportResult,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    #[serde(default)]
    pub feed_gram: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederStatusPayload {
    pub status: DeviceState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvStatusPayload {
    pub state: UvState,
    #[serde(default)]
    pub remaining: u32,
}

/// One DHT reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    #[serde(rename = "temp")]
    pub temperature: f64,
    #[serde(rename = "hum")]
    pub humidity: f64,
    /// The sensor board's own clock, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Report(DeviceReport),
    FeederStatus(FeederStatusPayload),
    UvStatus(UvStatusPayload),
    Sensor(SensorPayload),
    /// A topic this controller does not handle.
    Ignored,
}

pub fn decode_inbound(msg: &InboundMessage) -> Result<Inbound> {
    fn parse<'a, T: Deserialize<'a>>(msg: &'a InboundMessage) -> Result<T> {
        serde_json::from_slice(&msg.payload).map_err(|e| AquariumError::ReportParse {
            topic: msg.topic.clone(),
            reason: e.to_string(),
        })
    }

    Ok(match msg.topic.as_str() {
        DEVICE_REPORT_TOPIC => Inbound::Report(parse(msg)?),
        FEEDER_STATUS_TOPIC => Inbound::FeederStatus(parse(msg)?),
        UV_STATUS_TOPIC => Inbound::UvStatus(parse(msg)?),
        SENSOR_TOPIC => Inbound::Sensor(parse(msg)?),
        _ => Inbound::Ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str, body: &str) -> InboundMessage {
        InboundMessage::new(topic, body.as_bytes().to_vec())
    }

    #[test]
    fn feed_command_wire_shape() {
        let (topic, body) = encode_command(&Command::Feed { doses: 3 }).unwrap();
        assert_eq!(topic, FEEDER_COMMAND_TOPIC);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v, serde_json::json!({"action": "FEED", "dose": 3}));
    }

    #[test]
    fn uv_command_wire_shape() {
        let (topic, body) = encode_command(&Command::Uv {
            state: UvState::On,
            duration_secs: 1800,
        })
        .unwrap();
        assert_eq!(topic, UV_COMMAND_TOPIC);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v, serde_json::json!({"state": "ON", "duration_sec": 1800}));
    }

    #[test]
    fn decodes_feed_report() {
        let inbound = decode_inbound(&msg(
            DEVICE_REPORT_TOPIC,
            r#"{"result":"SUCCESS","type":"FEED","feed_gram":20}"#,
        ))
        .unwrap();
        assert_eq!(
            inbound,
            Inbound::Report(DeviceReport {
                result: ReportResult::Success,
                kind: ReportKind::Feed,
                feed_gram: 20,
            })
        );
    }

    #[test]
    fn uv_report_without_grams() {
        let inbound =
            decode_inbound(&msg(DEVICE_REPORT_TOPIC, r#"{"result":"FAILED","type":"UV"}"#)).unwrap();
        match inbound {
            Inbound::Report(r) => {
                assert_eq!(r.kind.device(), DeviceType::Uv);
                assert_eq!(r.feed_gram, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_status_topics() {
        assert_eq!(
            decode_inbound(&msg(FEEDER_STATUS_TOPIC, r#"{"status":"DISPENSING"}"#)).unwrap(),
            Inbound::FeederStatus(FeederStatusPayload {
                status: DeviceState::Dispensing
            })
        );
        assert_eq!(
            decode_inbound(&msg(UV_STATUS_TOPIC, r#"{"state":"ON","remaining":42}"#)).unwrap(),
            Inbound::UvStatus(UvStatusPayload {
                state: UvState::On,
                remaining: 42
            })
        );
    }

    #[test]
    fn decodes_sensor_reading() {
        let inbound = decode_inbound(&msg(
            SENSOR_TOPIC,
            r#"{"temp":26.5,"hum":71.2,"rtc_time":"2026-03-02 10:00:00"}"#,
        ))
        .unwrap();
        match inbound {
            Inbound::Sensor(p) => {
                assert_eq!(p.temperature, 26.5);
                assert_eq!(p.humidity, 71.2);
                assert_eq!(p.rtc_time.as_deref(), Some("2026-03-02 10:00:00"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            decode_inbound(&msg(SENSOR_TOPIC, r#"{"temp":26.5}"#)),
            Err(AquariumError::ReportParse { .. })
        ));
    }

    #[test]
    fn malformed_payload_is_report_parse_error() {
        let err = decode_inbound(&msg(DEVICE_REPORT_TOPIC, "{not json")).unwrap_err();
        assert!(matches!(err, AquariumError::ReportParse { ref topic, .. } if topic == DEVICE_REPORT_TOPIC));
        let err = decode_inbound(&msg(DEVICE_REPORT_TOPIC, r#"{"result":"MAYBE","type":"UV"}"#))
            .unwrap_err();
        assert!(matches!(err, AquariumError::ReportParse { .. }));
    }

    #[test]
    fn unknown_topic_is_ignored() {
        assert_eq!(
            decode_inbound(&msg("aquarium/heater/status", "{}")).unwrap(),
            Inbound::Ignored
        );
    }
}
