//! Application settings loaded from `config.yaml`.

use http_metrics::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub metrics: MetricsConfig,
    pub geo: GeoSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Upper bound on draining open connections after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoSettings {
    /// When off, every request is labelled with an unknown location.
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: geo_lookup::DEFAULT_IP_API_ENDPOINT.to_string(),
            timeout_ms: 3_000,
            cache_ttl_secs: 3_600,
            cache_capacity: 4_096,
        }
    }
}

impl GeoSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Copy that is safe to print: the backend password is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.metrics.prometheus_password.is_empty() {
            config.metrics.prometheus_password = "<redacted>".to_string();
        }
        config
    }
}
