use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// Two instruments claimed the same name. Raised while wiring the
    /// service; callers must not keep serving with an ambiguous registry.
    #[error("metric {0} is already registered")]
    AlreadyRegistered(String),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("failed to encode metrics: {0}")]
    Encode(String),
    #[error("geolocation setup failed: {0}")]
    Geo(#[from] geo_lookup::GeoError),
    #[error("counter restoration setup failed: {0}")]
    Restore(#[from] RestoreError),
    #[error("invalid metrics configuration: {0}")]
    InvalidConfig(String),
}

impl MetricsError {
    pub(crate) fn registration(name: &str, err: prometheus::Error) -> Self {
        match err {
            prometheus::Error::AlreadyReg => MetricsError::AlreadyRegistered(name.to_string()),
            other => MetricsError::Prometheus(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("metrics backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metrics backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed metrics backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("metrics backend query failed: {0}")]
    Query(String),
}
