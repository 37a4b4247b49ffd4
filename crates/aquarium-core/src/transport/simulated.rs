//! Hardware-free transport.
//!
//! Accepts every command and answers with the same status and report
//! messages a real feeder and UV unit publish, through the same inbound
//! channel, so the engine cannot tell the difference. Optionally also
//! publishes a slowly drifting temperature and humidity reading.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::{Command, Transport, UvState};
use crate::error::DispatchError;
use crate::protocol::{
    DeviceReport, FeederStatusPayload, InboundMessage, ReportKind, ReportResult, SensorPayload,
    UvStatusPayload, DEVICE_REPORT_TOPIC, FEEDER_STATUS_TOPIC, SENSOR_TOPIC, UV_STATUS_TOPIC,
};
use crate::scheduler::{spawn_periodic, TaskHandle};
use crate::types::DeviceState;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

pub struct SimulatedTransport {
    inbound: mpsc::Sender<InboundMessage>,
    dose_grams: u32,
    report_delay: Duration,
    countdown: Mutex<Option<TaskHandle>>,
    sensor_feed: Option<TaskHandle>,
}

impl SimulatedTransport {
    pub fn new(inbound: mpsc::Sender<InboundMessage>, dose_grams: u32, report_delay: Duration) -> Self {
        info!(report_delay_ms = report_delay.as_millis() as u64, "simulated transport ready");
        Self {
            inbound,
            dose_grams,
            report_delay,
            countdown: Mutex::new(None),
            sensor_feed: None,
        }
    }

    /// Publish a reading now and then every `every`, until the inbound
    /// channel closes.
    pub fn with_sensor_feed(mut self, every: Duration) -> Self {
        let tx = self.inbound.clone();
        let step = Arc::new(AtomicU64::new(0));
        info!(interval_secs = every.as_secs(), "simulated sensor feed started");
        self.sensor_feed = Some(spawn_periodic("sensor-feed", Duration::ZERO, every, move || {
            let tx = tx.clone();
            let n = step.fetch_add(1, Ordering::Relaxed);
            async move {
                let msg = match InboundMessage::json(SENSOR_TOPIC, &simulated_reading(n)) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = %e, "simulated reading not encoded");
                        return ControlFlow::Continue(());
                    }
                };
                if tx.send(msg).await.is_err() {
                    debug!("inbound channel closed, sensor feed stopping");
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
        }));
        self
    }

    fn replace_countdown(&self, next: Option<TaskHandle>) {
        let mut slot = self.countdown.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = next;
    }

    fn start_countdown(&self, seconds: u32) -> TaskHandle {
        let remaining = Arc::new(AtomicU32::new(seconds));
        let tx = self.inbound.clone();
        spawn_periodic("uv-countdown", COUNTDOWN_STEP, COUNTDOWN_STEP, move || {
            let remaining = remaining.clone();
            let tx = tx.clone();
            async move {
                let left = remaining.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                if left > 0 {
                    emit(&tx, UV_STATUS_TOPIC, &uv_status(UvState::On, left)).await;
                    return ControlFlow::Continue(());
                }
                emit(&tx, UV_STATUS_TOPIC, &uv_status(UvState::Off, 0)).await;
                emit(
                    &tx,
                    DEVICE_REPORT_TOPIC,
                    &DeviceReport {
                        result: ReportResult::Success,
                        kind: ReportKind::Uv,
                        feed_gram: 0,
                    },
                )
                .await;
                debug!("simulated uv countdown finished");
                ControlFlow::Break(())
            }
        })
    }
}

/// Reading number `n`: temperature drifts over 25-30 °C, humidity over 60-80 %.
fn simulated_reading(n: u64) -> SensorPayload {
    let phase = n as f64;
    let round = |v: f64| (v * 10.0).round() / 10.0;
    SensorPayload {
        temperature: round(27.5 + 2.5 * (phase * 0.3).sin()),
        humidity: round(70.0 + 10.0 * (phase * 0.2).cos()),
        rtc_time: None,
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.replace_countdown(None);
        if let Some(feed) = &self.sensor_feed {
            feed.cancel();
        }
    }
}

fn uv_status(state: UvState, remaining: u32) -> UvStatusPayload {
    UvStatusPayload { state, remaining }
}

async fn emit<T: Serialize>(tx: &mpsc::Sender<InboundMessage>, topic: &str, body: &T) {
    let msg = match InboundMessage::json(topic, body) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(topic, error = %e, "simulated message not encoded");
            return;
        }
    };
    if tx.send(msg).await.is_err() {
        debug!(topic, "inbound channel closed, simulated message dropped");
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&self, command: &Command) -> Result<(), DispatchError> {
        match *command {
            Command::Feed { doses } => {
                let tx = self.inbound.clone();
                let delay = self.report_delay;
                let grams = doses.saturating_mul(self.dose_grams);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    emit(
                        &tx,
                        FEEDER_STATUS_TOPIC,
                        &FeederStatusPayload {
                            status: DeviceState::Dispensing,
                        },
                    )
                    .await;
                    emit(
                        &tx,
                        DEVICE_REPORT_TOPIC,
                        &DeviceReport {
                            result: ReportResult::Success,
                            kind: ReportKind::Feed,
                            feed_gram: grams,
                        },
                    )
                    .await;
                    emit(
                        &tx,
                        FEEDER_STATUS_TOPIC,
                        &FeederStatusPayload {
                            status: DeviceState::Idle,
                        },
                    )
                    .await;
                });
            }
            Command::Uv {
                state: UvState::On,
                duration_secs,
            } => {
                self.replace_countdown(None);
                emit(&self.inbound, UV_STATUS_TOPIC, &uv_status(UvState::On, duration_secs)).await;
                if duration_secs > 0 {
                    self.replace_countdown(Some(self.start_countdown(duration_secs)));
                }
            }
            Command::Uv {
                state: UvState::Off,
                ..
            } => {
                self.replace_countdown(None);
                emit(&self.inbound, UV_STATUS_TOPIC, &uv_status(UvState::Off, 0)).await;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
