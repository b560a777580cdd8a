use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio::fs;

use super::runtime::LoadedConfig;
use crate::config::Config;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file, defaults and environment)
    Show,

    /// Print the configuration file location
    Path,

    /// Validate the configuration file
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, loaded: &LoadedConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            println!("Effective configuration ({}):", source_label(loaded));
            println!("{}", serde_yaml::to_string(&loaded.config.redacted())?);
        }
        ConfigAction::Path => {
            println!("{}", loaded.path.display());
        }
        ConfigAction::Validate => {
            if loaded.found {
                let raw = fs::read_to_string(&loaded.path)
                    .await
                    .with_context(|| format!("reading {}", loaded.path.display()))?;
                serde_yaml::from_str::<Config>(&raw)
                    .with_context(|| format!("parsing {}", loaded.path.display()))?;
                println!("Configuration file {} is valid", loaded.path.display());
            } else {
                println!(
                    "No configuration file at {}; defaults are valid",
                    loaded.path.display()
                );
            }
        }
    }

    Ok(())
}

fn source_label(loaded: &LoadedConfig) -> String {
    if loaded.found {
        loaded.path.display().to_string()
    } else {
        format!("defaults, {} not found", loaded.path.display())
    }
}
