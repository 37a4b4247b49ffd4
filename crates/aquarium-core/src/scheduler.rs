//! Periodic tasks: the coarse and fine ticks, the inbound pump, and the
//! simulated UV countdown all run through [`spawn_periodic`].

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::{Engine, TickOutcome};
use crate::protocol::InboundMessage;

// ---------------------------------------------------------------------------
// TaskHandle / spawn_periodic
// ---------------------------------------------------------------------------

/// Handle to a spawned background task.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    inner: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Abort the task. Safe to call after it has finished.
    pub fn cancel(&self) {
        if !self.inner.is_finished() {
            debug!(task = self.name, "task cancelled");
        }
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Run `job` every `period` after `initial_delay`, until it returns
/// `ControlFlow::Break` or the handle is cancelled.
///
/// Each run is awaited before the next tick is taken; ticks missed while a
/// run is in flight are skipped, not queued.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    initial_delay: Duration,
    period: Duration,
    mut job: F,
) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let inner = tokio::spawn(async move {
        if !initial_delay.is_zero() {
            tokio::time::sleep(initial_delay).await;
        }
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if job().await.is_break() {
                debug!(task = name, "periodic task finished");
                break;
            }
        }
    });
    TaskHandle { name, inner }
}

// ---------------------------------------------------------------------------
// SingleFlight
// ---------------------------------------------------------------------------

/// Non-reentrancy guard: at most one holder of the permit at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another permit is alive.
    pub fn try_acquire(&self) -> Option<FlightPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit { flag: &self.busy })
    }
}

#[derive(Debug)]
pub struct FlightPermit<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Delay until the next wall-clock minute boundary.
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute =
        Duration::from_secs(u64::from(now.second())) + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(into_minute)
}

/// The running coarse tick, fine tick and inbound pump.
pub struct Scheduler {
    tasks: Vec<TaskHandle>,
}

impl Scheduler {
    pub fn start(
        engine: Arc<Engine>,
        cfg: &SchedulerConfig,
        inbound: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        let coarse_delay = if cfg.align_to_minute {
            until_next_minute(engine.now())
        } else {
            Duration::ZERO
        };
        info!(
            coarse_period_secs = cfg.coarse_period().as_secs(),
            fine_period_secs = cfg.fine_period().as_secs(),
            coarse_delay_ms = coarse_delay.as_millis() as u64,
            "scheduler starting"
        );

        let coarse_engine = engine.clone();
        let coarse = spawn_periodic("coarse-tick", coarse_delay, cfg.coarse_period(), move || {
            let engine = coarse_engine.clone();
            async move {
                match engine.coarse_tick().await {
                    Ok(TickOutcome::Skipped) => warn!("coarse tick skipped: previous run in flight"),
                    Ok(TickOutcome::Ran(summary)) => debug!(?summary, "coarse tick done"),
                    Err(e) => error!(error = %e, "coarse tick failed"),
                }
                ControlFlow::Continue(())
            }
        });

        let fine_engine = engine.clone();
        let fine = spawn_periodic("fine-tick", cfg.fine_period(), cfg.fine_period(), move || {
            let engine = fine_engine.clone();
            async move {
                match engine.fine_tick().await {
                    Ok(TickOutcome::Skipped) => debug!("fine tick skipped: previous run in flight"),
                    Ok(TickOutcome::Ran(_)) => {}
                    Err(e) => error!(error = %e, "fine tick failed"),
                }
                ControlFlow::Continue(())
            }
        });

        let pump = TaskHandle {
            name: "inbound-pump",
            inner: tokio::spawn(run_inbound(engine, inbound)),
        };

        Self {
            tasks: vec![coarse, fine, pump],
        }
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.cancel();
        }
        info!("scheduler stopped");
    }
}

/// Feed every inbound device message to the engine until the channel closes.
pub async fn run_inbound(engine: Arc<Engine>, mut rx: mpsc::Receiver<InboundMessage>) {
    while let Some(msg) = rx.recv().await {
        let topic = msg.topic.clone();
        if let Err(e) = engine.handle_inbound(msg).await {
            warn!(topic = %topic, error = %e, "inbound message dropped");
        }
    }
    debug!("inbound channel closed");
}
