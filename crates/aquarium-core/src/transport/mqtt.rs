use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::dispatch::{Command, Transport};
use crate::error::{AquariumError, DispatchError, Result};
use crate::protocol::{encode_command, InboundMessage, INBOUND_TOPICS};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 32;

/// MQTT broker connection. Plain TCP only.
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    /// Start the event loop. The broker connection is established in the
    /// background; `send` fails with `Unavailable` until it is up.
    pub fn connect(cfg: &MqttConfig, inbound: mpsc::Sender<InboundMessage>) -> Result<Self> {
        if cfg.broker.trim().is_empty() {
            return Err(AquariumError::Validation(
                "transport.mqtt.broker is empty".to_string(),
            ));
        }
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.broker.clone(), cfg.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&cfg.user, &cfg.pass) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, events) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let event_loop = tokio::spawn(drive(
            events,
            client.clone(),
            connected.clone(),
            inbound,
        ));
        info!(broker = %cfg.broker, port = cfg.port, client_id = %cfg.client_id, "mqtt transport started");
        Ok(Self {
            client,
            connected,
            event_loop,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

async fn drive(
    mut events: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    inbound: mpsc::Sender<InboundMessage>,
) {
    loop {
        match events.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Release);
                info!("mqtt connected");
                for topic in INBOUND_TOPICS {
                    if let Err(e) = client.try_subscribe(topic, QoS::AtMostOnce) {
                        error!(topic, error = %e, "mqtt subscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if inbound.send(msg).await.is_err() {
                    debug!("inbound channel closed, stopping mqtt event loop");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::AcqRel) {
                    warn!(error = %e, "mqtt connection lost");
                } else {
                    debug!(error = %e, "mqtt connect attempt failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn send(&self, command: &Command) -> std::result::Result<(), DispatchError> {
        if !self.is_connected() {
            return Err(DispatchError::Unavailable(
                "mqtt broker not connected".to_string(),
            ));
        }
        let (topic, body) = encode_command(command)?;
        self.client
            .publish(topic, QoS::AtMostOnce, false, body)
            .await
            .map_err(|e| DispatchError::Unavailable(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}
