//! Inbound device traffic: completion reports and status messages.

use tracing::{debug, error, info, warn};

use super::Engine;
use crate::dispatch::UvState;
use crate::error::Result;
use crate::protocol::{decode_inbound, DeviceReport, Inbound, InboundMessage, ReportKind, ReportResult};
use crate::types::{ActionStatus, DeviceState, DeviceType};

impl Engine {
    /// Apply one inbound message. Malformed payloads fail with
    /// `ReportParse` and change nothing.
    pub async fn handle_inbound(&self, msg: InboundMessage) -> Result<()> {
        match decode_inbound(&msg)? {
            Inbound::Report(report) => self.handle_report(report).await,
            Inbound::FeederStatus(p) => {
                self.mirror(DeviceType::Feeder, p.status, 0).await;
                Ok(())
            }
            Inbound::UvStatus(p) => {
                let state = match p.state {
                    UvState::On => DeviceState::On,
                    UvState::Off => DeviceState::Off,
                };
                self.mirror(DeviceType::Uv, state, p.remaining).await;
                Ok(())
            }
            Inbound::Sensor(p) => {
                let now = self.now();
                if let Some(rtc) = &p.rtc_time {
                    debug!(rtc_time = %rtc, "sensor reading carries device clock");
                }
                self.db(move |s| s.sensors().record(p.temperature, p.humidity, now))
                    .await?;
                Ok(())
            }
            Inbound::Ignored => {
                debug!(topic = %msg.topic, "ignoring message on unhandled topic");
                Ok(())
            }
        }
    }

    async fn handle_report(&self, report: DeviceReport) -> Result<()> {
        let device = report.kind.device();
        let Some(open) = self.db(move |s| s.ledger().find_open(device, None)).await? else {
            warn!(device = %device, result = ?report.result, "report with no open action");
            return Ok(());
        };

        let status = match report.result {
            ReportResult::Success => ActionStatus::Success,
            ReportResult::Failed => ActionStatus::Failed,
        };
        let now = self.now();
        let id = open.id;
        let Some(closed) = self.db(move |s| s.ledger().close(id, status, now)).await? else {
            debug!(action_id = %id, "report for action closed concurrently");
            return Ok(());
        };
        info!(action_id = %id, device = %device, status = %closed.status, "device report applied");

        if report.kind == ReportKind::Feed && status == ActionStatus::Success && report.feed_gram > 0 {
            let grams = u64::from(report.feed_gram);
            if let Err(e) = self.db(move |s| s.stock().decrement(grams, now)).await {
                error!(action_id = %id, grams, error = %e, "stock not decremented");
            }
        }

        match device {
            DeviceType::Feeder => self.mirror(DeviceType::Feeder, DeviceState::Idle, 0).await,
            DeviceType::Uv => self.mirror(DeviceType::Uv, DeviceState::Off, 0).await,
        }
        Ok(())
    }
}
