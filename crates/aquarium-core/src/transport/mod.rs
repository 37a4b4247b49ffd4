//! Transports that carry commands to devices and reports back.

pub mod mqtt;
pub mod simulated;
pub mod testing;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{TransportConfig, TransportMode};
use crate::dispatch::Transport;
use crate::error::Result;
use crate::protocol::InboundMessage;

pub use mqtt::MqttTransport;
pub use simulated::SimulatedTransport;

/// Capacity of the inbound message channel.
pub const INBOUND_CAPACITY: usize = 256;

/// Build the configured transport, wired to send device traffic into `inbound`.
pub fn build(
    cfg: &TransportConfig,
    dose_grams: u32,
    inbound: mpsc::Sender<InboundMessage>,
) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match cfg.mode {
        TransportMode::Simulated => {
            let sim = SimulatedTransport::new(
                inbound,
                dose_grams,
                std::time::Duration::from_millis(cfg.simulated.report_delay_ms),
            );
            match cfg.simulated.sensor_interval() {
                Some(every) => Arc::new(sim.with_sensor_feed(every)),
                None => Arc::new(sim),
            }
        }
        TransportMode::Mqtt => Arc::new(MqttTransport::connect(&cfg.mqtt, inbound)?),
    };
    Ok(transport)
}
