use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: &str = "success";

/// One ip-api.com answer. Only `lat`, `lon` and `country` end up in metric
/// labels; the rest is carried along for callers that want it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub isp: String,
    #[serde(default)]
    pub org: String,
    #[serde(default, rename = "as")]
    pub as_name: String,
}

impl Location {
    pub fn new(lat: f64, lon: f64, country: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            lat,
            lon,
            country: country.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}
