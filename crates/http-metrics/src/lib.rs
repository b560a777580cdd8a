//! Request instrumentation for axum services.
//!
//! Every request passing through [`track_requests`] lands in three
//! instruments: a duration histogram and two counters (daily, monthly) keyed by
//! the caller's IP, geolocation and crawler flag. Counters are seeded from the
//! metrics backend when [`RequestMetrics`] is built and rolled over at local
//! midnight by the [`rollover`] scheduler.

pub mod access_log;
pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod labels;
pub mod metrics;
pub mod middleware;
pub mod prometheus_collector;
pub mod restore;
pub mod rollover;

pub use access_log::{log_requests, AccessEntry, AccessLog, ExtraField};
pub use collector::{Exposition, ExpositionFormat, MetricsCollector};
pub use config::MetricsConfig;
pub use error::{MetricsError, MetricsResult, RestoreError};
pub use labels::{CounterKind, DurationLabels, GeoLabels, Instrument, Observation, RequestLabels};
pub use metrics::{PendingRequest, RequestMetrics, RequestMetricsBuilder};
pub use middleware::{scrape_handler, track_requests};
pub use prometheus_collector::PrometheusCollector;
pub use restore::{
    restore_counters, CounterSource, PrometheusQueryClient, RestoreOutcome, RestoreReport,
};
pub use rollover::{Clock, Rollover, RolloverHandle, RolloverScheduler, SystemClock};
