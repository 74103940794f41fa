pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::markets::MarketsOptions;
use crate::core::config::AppConfig;
use crate::core::state::MarketsController;
use crate::providers::CoinGeckoProvider;
use crate::store::SnapshotStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

pub enum AppCommand {
    Markets(MarketsOptions),
    Show { id: String },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let provider = Arc::new(CoinGeckoProvider::new(
        config.coingecko_base_url(),
        &config.currency,
    ));
    let store = open_store(&config);
    let controller = MarketsController::new(
        provider,
        store,
        config.default_limit,
        config.cache_ttl_secs,
    );

    match command {
        AppCommand::Markets(options) => cli::markets::run(&controller, &config, options).await,
        AppCommand::Show { id } => cli::show::run(&controller, &id).await,
    }
}

fn open_store(config: &AppConfig) -> Arc<dyn SnapshotStore> {
    let disk = config
        .default_data_path()
        .and_then(|path| store::disk::DiskStore::open(&path));
    match disk {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Disk cache unavailable, using in-memory store: {e:#}");
            Arc::new(store::memory::MemoryStore::new())
        }
    }
}
