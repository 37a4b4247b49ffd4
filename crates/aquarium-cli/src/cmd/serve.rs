use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use aquarium_core::clock::SystemClock;
use aquarium_core::config::{TransportMode, WarnLevel};
use aquarium_core::dispatch::Dispatcher;
use aquarium_core::scheduler::Scheduler;
use aquarium_core::transport::{self, INBOUND_CAPACITY};
use aquarium_core::{Engine, EngineSettings, Store};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub fn run(
    config_path: &Path,
    store: Option<&PathBuf>,
    port: Option<u16>,
    transport_mode: Option<&str>,
) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path, store)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(mode) = transport_mode {
        config.transport.mode = mode
            .parse::<TransportMode>()
            .context("invalid --transport")?;
    }

    let warnings = config.validate();
    for w in &warnings {
        warn!(level = ?w.level, "{}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors; run `aquariumd config validate`");
    }

    let settings = EngineSettings::from_config(&config)?;
    let store = Store::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let transport = transport::build(&config.transport, settings.dose_grams, tx)
            .context("failed to start transport")?;
        info!(transport = transport.name(), "transport ready");
        let dispatcher = Dispatcher::new(transport, config.transport.dispatch_timeout());

        let engine = Arc::new(Engine::new(
            store,
            dispatcher,
            Arc::new(SystemClock),
            settings,
        ));
        let recovered = engine.bootstrap().await?;
        if recovered > 0 {
            warn!(recovered, "stale pending actions from a previous run marked failed");
        }

        let scheduler = Scheduler::start(engine.clone(), &config.scheduler, rx);
        let result = tokio::select! {
            res = aquarium_server::serve(engine, config.server.port) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                Ok(())
            }
        };
        scheduler.shutdown();
        result
    })
}
