pub mod config;
pub mod history;
pub mod seed;
pub mod serve;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use aquarium_core::config::Config;
use aquarium_core::Store;

pub(crate) fn load_config(config_path: &Path, store: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    if let Some(path) = store {
        config.store.path = path.clone();
    }
    Ok(config)
}

/// Load the config and open the store it names.
pub(crate) fn open_store(
    config_path: &Path,
    store: Option<&PathBuf>,
) -> anyhow::Result<(Config, Store)> {
    let config = load_config(config_path, store)?;
    let store = Store::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))?;
    Ok((config, store))
}
