//! TrafficMeter library
//!
//! Exposes the CLI, configuration and server modules for integration testing

pub mod cli;
pub mod config;
pub mod server;

pub use config::Config;
