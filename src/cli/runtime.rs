use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

pub const APP_DIR: &str = "trafficmeter";

/// `RUST_LOG` wins over `level`; `debug` wins over both.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = if debug {
        EnvFilter::new(level.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// Whether `path` existed; defaults are used otherwise.
    pub found: bool,
}

/// Priority: explicit path > ./config/config.yaml >
/// ~/.config/trafficmeter/config.yaml > defaults. Environment overrides are
/// applied on top in every case.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut loaded = read_config(&path).await?;
    loaded.config.metrics.apply_env();
    Ok(loaded)
}

fn default_config_path() -> Result<PathBuf> {
    let local_config = PathBuf::from("config/config.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push(APP_DIR);
    path.push("config.yaml");
    Ok(path)
}

async fn read_config(path: &Path) -> Result<LoadedConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(LoadedConfig {
            config: Config::default(),
            path: path.to_path_buf(),
            found: false,
        });
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        found: true,
    })
}
