//! Outbound commands and the transport seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::DispatchError;
use crate::types::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UvState {
    On,
    Off,
}

impl UvState {
    pub fn as_str(self) -> &'static str {
        match self {
            UvState::On => "ON",
            UvState::Off => "OFF",
        }
    }
}

impl std::fmt::Display for UvState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Feed { doses: u32 },
    /// `duration_secs` is 0 for schedule-driven ON; the ledger owns the end.
    Uv { state: UvState, duration_secs: u32 },
}

impl Command {
    pub fn uv_off() -> Self {
        Command::Uv {
            state: UvState::Off,
            duration_secs: 0,
        }
    }

    pub fn device(&self) -> DeviceType {
        match self {
            Command::Feed { .. } => DeviceType::Feeder,
            Command::Uv { .. } => DeviceType::Uv,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Feed { doses } => write!(f, "FEED x{doses}"),
            Command::Uv {
                state,
                duration_secs,
            } => write!(f, "UV {state} {duration_secs}s"),
        }
    }
}

/// Downstream that delivers commands to a device.
///
/// Completion reports come back asynchronously through the inbound channel,
/// not through the return value of `send`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, command: &Command) -> Result<(), DispatchError>;

    fn name(&self) -> &'static str;
}

/// Sends commands with a bounded timeout. Never retries.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub async fn send(&self, command: Command) -> Result<(), DispatchError> {
        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(&command)).await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        };
        match &outcome {
            Ok(()) => info!(
                device = %command.device(),
                command = %command,
                transport = self.transport.name(),
                "command dispatched"
            ),
            Err(e) => error!(
                device = %command.device(),
                command = %command,
                transport = self.transport.name(),
                error = %e,
                "dispatch failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    struct Hang;

    #[async_trait]
    impl Transport for Hang {
        async fn send(&self, _command: &Command) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "hang"
        }
    }

    #[tokio::test]
    async fn forwards_to_transport() {
        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(Arc::new(transport.clone()), Duration::from_secs(1));
        dispatcher.send(Command::Feed { doses: 2 }).await.unwrap();
        assert_eq!(transport.sent(), vec![Command::Feed { doses: 2 }]);
    }

    #[tokio::test]
    async fn transport_error_passes_through() {
        let transport = RecordingTransport::new();
        transport.fail_next("broker down");
        let dispatcher = Dispatcher::new(Arc::new(transport), Duration::from_secs(1));
        let err = dispatcher.send(Command::uv_off()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_times_out() {
        let dispatcher = Dispatcher::new(Arc::new(Hang), Duration::from_secs(5));
        let err = dispatcher.send(Command::uv_off()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn command_device() {
        assert_eq!(Command::Feed { doses: 1 }.device(), DeviceType::Feeder);
        assert_eq!(Command::uv_off().device(), DeviceType::Uv);
    }
}
