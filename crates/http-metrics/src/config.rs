use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::extract::DEFAULT_CLIENT_IP_HEADER;

pub const APP_ENV: &str = "METRICS_APP_VALUE";
pub const PROMETHEUS_HOST_ENV: &str = "PROMETHEUS_HOST";
pub const PROMETHEUS_USERNAME_ENV: &str = "PROMETHEUS_USERNAME";
pub const PROMETHEUS_PASSWORD_ENV: &str = "PROMETHEUS_PASSWORD";

/// Identity of the instrumented application and the backend its counters are
/// restored from.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub app: String,
    pub prometheus_host: String,
    pub prometheus_username: String,
    pub prometheus_password: String,
    /// Header trusted to carry the caller address. Its value is taken as is.
    pub client_ip_header: String,
    pub backend_timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            app: "app".to_string(),
            prometheus_host: String::new(),
            prometheus_username: String::new(),
            prometheus_password: String::new(),
            client_ip_header: DEFAULT_CLIENT_IP_HEADER.to_string(),
            backend_timeout_secs: 10,
        }
    }
}

impl MetricsConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            ..Self::default()
        }
    }

    pub fn with_backend(
        mut self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.prometheus_host = host.into();
        self.prometheus_username = username.into();
        self.prometheus_password = password.into();
        self
    }

    /// Overrides fields from `METRICS_APP_VALUE`, `PROMETHEUS_HOST`,
    /// `PROMETHEUS_USERNAME` and `PROMETHEUS_PASSWORD` when they are set.
    pub fn apply_env(&mut self) {
        let overrides: [(&str, &mut String); 4] = [
            (APP_ENV, &mut self.app),
            (PROMETHEUS_HOST_ENV, &mut self.prometheus_host),
            (PROMETHEUS_USERNAME_ENV, &mut self.prometheus_username),
            (PROMETHEUS_PASSWORD_ENV, &mut self.prometheus_password),
        ];
        for (key, field) in overrides {
            if let Ok(value) = env::var(key) {
                *field = value;
            }
        }
    }

    pub fn restoration_enabled(&self) -> bool {
        !self.prometheus_host.trim().is_empty()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs.max(1))
    }
}

impl fmt::Debug for MetricsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.prometheus_password.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("MetricsConfig")
            .field("app", &self.app)
            .field("prometheus_host", &self.prometheus_host)
            .field("prometheus_username", &self.prometheus_username)
            .field("prometheus_password", &password)
            .field("client_ip_header", &self.client_ip_header)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .finish()
    }
}
