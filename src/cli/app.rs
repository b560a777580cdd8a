use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let loaded = load_config(cli.config.as_ref()).await?;
    let logging = &loaded.config.logging;
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, cli.debug, logging.json)?;

    info!("Starting TrafficMeter v{}", env!("CARGO_PKG_VERSION"));
    if loaded.found {
        info!("Loaded configuration from: {}", loaded.path.display());
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            loaded.path.display()
        );
    }

    match dispatch(&cli, loaded).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
