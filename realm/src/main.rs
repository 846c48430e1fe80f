//! Realm server binary.
use std::path::{Path, PathBuf};

use realm::{RealmServer, config::RealmConfig, logger};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const CONFIG_PATH: &str = "config/realm_config.json5";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Path::new(CONFIG_PATH);
    let config = RealmConfig::load_or_create(config_path)?;
    logger::init(&config.log)?;

    let base_dir = config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let server = RealmServer::new(config, base_dir);
    server.start()?;

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal");

    tokio::task::spawn_blocking(move || server.stop()).await?;
    Ok(())
}
