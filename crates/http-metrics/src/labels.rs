//! Instrument names and the label sets they are keyed by.

use geo_lookup::Location;
use std::fmt;
use std::time::Duration;

pub const DURATION_METRIC: &str = "http_server_request_duration_milliseconds";
pub const DAILY_METRIC: &str = "http_server_request_count_daily";
pub const MONTHLY_METRIC: &str = "http_server_request_count_monthly";

pub const DURATION_BUCKETS_MS: [f64; 12] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
];

pub const DURATION_LABEL_NAMES: [&str; 4] = ["app", "endpoint", "method", "status"];
pub const REQUEST_LABEL_NAMES: [&str; 9] = [
    "app", "endpoint", "method", "status", "ip", "lat", "lon", "country", "crawler",
];

pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Daily,
    Monthly,
}

impl CounterKind {
    pub const ALL: [CounterKind; 2] = [CounterKind::Daily, CounterKind::Monthly];

    pub fn metric_name(self) -> &'static str {
        match self {
            CounterKind::Daily => DAILY_METRIC,
            CounterKind::Monthly => MONTHLY_METRIC,
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            CounterKind::Daily => "Counts daily http requests",
            CounterKind::Monthly => "Counts monthly http requests",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::Daily => "daily",
            CounterKind::Monthly => "monthly",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instrument {
    Duration,
    Counter(CounterKind),
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [
        Instrument::Duration,
        Instrument::Counter(CounterKind::Daily),
        Instrument::Counter(CounterKind::Monthly),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Duration => DURATION_METRIC,
            Instrument::Counter(kind) => kind.metric_name(),
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            Instrument::Duration => "histogram_vec",
            Instrument::Counter(_) => "counter_vec",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DurationLabels {
    pub app: String,
    pub endpoint: String,
    pub method: String,
    pub status: String,
}

impl DurationLabels {
    pub fn values(&self) -> [&str; 4] {
        [&self.app, &self.endpoint, &self.method, &self.status]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestLabels {
    pub app: String,
    pub endpoint: String,
    pub method: String,
    pub status: String,
    pub ip: String,
    pub lat: String,
    pub lon: String,
    pub country: String,
    pub crawler: String,
}

impl RequestLabels {
    pub fn values(&self) -> [&str; 9] {
        [
            &self.app,
            &self.endpoint,
            &self.method,
            &self.status,
            &self.ip,
            &self.lat,
            &self.lon,
            &self.country,
            &self.crawler,
        ]
    }

    pub fn to_values(&self) -> Vec<String> {
        self.values().iter().map(|v| v.to_string()).collect()
    }

    /// Inverse of [`RequestLabels::to_values`]; `None` unless exactly nine
    /// values are given.
    pub fn from_values(values: &[String]) -> Option<Self> {
        let [app, endpoint, method, status, ip, lat, lon, country, crawler] = values else {
            return None;
        };
        Some(Self {
            app: app.clone(),
            endpoint: endpoint.clone(),
            method: method.clone(),
            status: status.clone(),
            ip: ip.clone(),
            lat: lat.clone(),
            lon: lon.clone(),
            country: country.clone(),
            crawler: crawler.clone(),
        })
    }
}

/// Geolocation part of the label set.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoLabels {
    Found {
        lat: String,
        lon: String,
        country: String,
    },
    NotFound,
}

impl GeoLabels {
    pub fn from_location(location: &Location) -> Self {
        GeoLabels::Found {
            lat: format!("{:.6}", location.lat),
            lon: format!("{:.6}", location.lon),
            country: location.country.clone(),
        }
    }

    /// `(lat, lon, country)`; empty coordinates and `"Unknown"` when not found.
    pub fn into_parts(self) -> (String, String, String) {
        match self {
            GeoLabels::Found { lat, lon, country } => (lat, lon, country),
            GeoLabels::NotFound => (String::new(), String::new(), UNKNOWN_COUNTRY.to_string()),
        }
    }
}

/// Everything known about one finished request.
#[derive(Clone, Debug)]
pub struct Observation {
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub ip: String,
    pub latitude: String,
    pub longitude: String,
    pub country: String,
    pub crawler: bool,
    pub duration: Duration,
}

impl Observation {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_millis() as f64
    }

    pub fn duration_labels(&self, app: &str) -> DurationLabels {
        DurationLabels {
            app: app.to_string(),
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            status: self.status.to_string(),
        }
    }

    pub fn request_labels(&self, app: &str) -> RequestLabels {
        RequestLabels {
            app: app.to_string(),
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            status: self.status.to_string(),
            ip: self.ip.clone(),
            lat: self.latitude.clone(),
            lon: self.longitude.clone(),
            country: self.country.clone(),
            crawler: self.crawler.to_string(),
        }
    }
}
