//! Seeding counters from the metrics backend at startup.
//!
//! A restart would otherwise zero the daily and monthly totals. Each counter
//! kind is queried independently; a failure is logged and leaves that kind
//! empty without touching the other one.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::collector::MetricsCollector;
use crate::config::MetricsConfig;
use crate::error::RestoreError;
use crate::labels::{CounterKind, RequestLabels};

/// Where persisted counter values come from.
#[async_trait]
pub trait CounterSource: Send + Sync {
    /// Every series of `kind` recorded for `app`, with its last value.
    async fn fetch(
        &self,
        kind: CounterKind,
        app: &str,
    ) -> Result<Vec<(RequestLabels, u64)>, RestoreError>;
}

/// Instant-query client for a Prometheus compatible HTTP API.
pub struct PrometheusQueryClient {
    client: Client,
    host: String,
    username: String,
    password: String,
}

impl PrometheusQueryClient {
    pub fn new(config: &MetricsConfig) -> Result<Self, RestoreError> {
        let client = Client::builder()
            .timeout(config.backend_timeout())
            .build()?;
        Ok(Self {
            client,
            host: config.prometheus_host.trim_end_matches('/').to_string(),
            username: config.prometheus_username.clone(),
            password: config.prometheus_password.clone(),
        })
    }

    pub fn query_expr(kind: CounterKind, app: &str) -> String {
        format!("{}{{app=\"{}\"}}", kind.metric_name(), app)
    }
}

#[async_trait]
impl CounterSource for PrometheusQueryClient {
    async fn fetch(
        &self,
        kind: CounterKind,
        app: &str,
    ) -> Result<Vec<(RequestLabels, u64)>, RestoreError> {
        let url = format!("{}/api/v1/query", self.host);
        let response = self
            .client
            .get(&url)
            .query(&[("query", Self::query_expr(kind, app))])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(RestoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let payload: QueryResponse = serde_json::from_slice(&bytes)?;
        if payload.status == "error" {
            return Err(RestoreError::Query(
                payload.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(payload
            .data
            .result
            .into_iter()
            .map(|sample| {
                let value = sample.counter_value();
                (sample.metric.into_labels(app), value)
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<SeriesSample>,
}

#[derive(Debug, Deserialize)]
struct SeriesSample {
    #[serde(default)]
    metric: SeriesLabels,
    #[serde(default)]
    value: Vec<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeriesLabels {
    endpoint: String,
    method: String,
    status: String,
    ip: String,
    lat: String,
    lon: String,
    country: String,
    crawler: String,
}

impl SeriesLabels {
    fn into_labels(self, app: &str) -> RequestLabels {
        RequestLabels {
            app: app.to_string(),
            endpoint: self.endpoint,
            method: self.method,
            status: self.status,
            ip: self.ip,
            lat: self.lat,
            lon: self.lon,
            country: self.country,
            crawler: self.crawler,
        }
    }
}

impl SeriesSample {
    /// The sample is `[timestamp, "value"]`. Anything but a non-negative
    /// integer string counts as zero.
    fn counter_value(&self) -> u64 {
        let raw = self.value.get(1).and_then(JsonValue::as_str);
        match raw.map(str::parse::<u64>) {
            Some(Ok(value)) => value,
            _ => {
                warn!(value = ?self.value, "unparsable counter value, restoring as 0");
                0
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { series: usize, total: u64 },
    Failed(String),
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreReport {
    pub kind: CounterKind,
    pub outcome: RestoreOutcome,
}

/// Adds the persisted values of both counter kinds onto `collector`.
pub async fn restore_counters(
    collector: &dyn MetricsCollector,
    source: &dyn CounterSource,
    app: &str,
) -> Vec<RestoreReport> {
    let mut reports = Vec::with_capacity(CounterKind::ALL.len());
    for kind in CounterKind::ALL {
        let outcome = match source.fetch(kind, app).await {
            Ok(series) => {
                let count = series.len();
                let mut total = 0u64;
                for (labels, value) in series {
                    collector.add(kind, &labels, value);
                    total = total.saturating_add(value);
                }
                info!(metric = kind.metric_name(), series = count, total, "restored counter");
                RestoreOutcome::Restored {
                    series: count,
                    total,
                }
            }
            Err(err) => {
                error!(metric = kind.metric_name(), %err, "failed to restore counter");
                RestoreOutcome::Failed(err.to_string())
            }
        };
        reports.push(RestoreReport { kind, outcome });
    }
    reports
}

/// Report used when no backend is configured.
pub fn skipped() -> Vec<RestoreReport> {
    CounterKind::ALL
        .into_iter()
        .map(|kind| RestoreReport {
            kind,
            outcome: RestoreOutcome::Skipped,
        })
        .collect()
}
