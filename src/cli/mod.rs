pub mod app;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod runtime;
pub mod serve;

pub use config::{cmd_config, ConfigArgs};
pub use serve::{cmd_serve, ServeArgs};
