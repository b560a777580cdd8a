use thiserror::Error;

pub type GeoResult<T> = Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geolocation service returned {0}")]
    Status(u16),
    #[error("malformed geolocation response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("lookup for {ip} unsuccessful: {reason}")]
    Lookup { ip: String, reason: String },
    #[error("not an IP address: {0:?}")]
    InvalidAddress(String),
    #[error("no location known for {0}")]
    NotFound(String),
}
