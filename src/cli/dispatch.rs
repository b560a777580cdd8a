use super::commands::Commands;
use super::config::cmd_config;
use super::env::CliArgs;
use super::info::cmd_info;
use super::runtime::LoadedConfig;
use super::serve::cmd_serve;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, loaded: LoadedConfig) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, loaded.config).await,
        Commands::Config(args) => cmd_config(args, &loaded).await,
        Commands::Info => cmd_info(&loaded),
    }
}
