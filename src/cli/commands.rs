use clap::Subcommand;

use super::config::ConfigArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Serve an instrumented HTTP application with a /metrics endpoint
    Serve(ServeArgs),

    /// Inspect TrafficMeter configuration
    Config(ConfigArgs),

    /// Show version and build information
    Info,
}
