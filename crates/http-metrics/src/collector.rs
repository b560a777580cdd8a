//! The capability set restoration, rollover and the middleware are written
//! against. One adapter per metrics system implements it.

use crate::error::MetricsResult;
use crate::labels::{CounterKind, DurationLabels, Instrument, RequestLabels};

const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpositionFormat {
    #[default]
    Text,
    Protobuf,
}

impl ExpositionFormat {
    /// Picks the format from an `Accept` header; text unless the scraper asks
    /// for delimited protobuf.
    pub fn negotiate(accept: Option<&str>) -> Self {
        match accept {
            Some(value) if value.contains(PROTOBUF_MEDIA_TYPE) => ExpositionFormat::Protobuf,
            _ => ExpositionFormat::Text,
        }
    }
}

/// A serialized scrape.
#[derive(Clone, Debug)]
pub struct Exposition {
    pub content_type: String,
    pub body: Vec<u8>,
}

pub trait MetricsCollector: Send + Sync {
    /// Exposes `instrument` for scraping. A name collision is a wiring error
    /// and comes back as [`crate::MetricsError::AlreadyRegistered`].
    fn register(&self, instrument: Instrument) -> MetricsResult<()>;

    fn observe_duration(&self, labels: &DurationLabels, millis: f64);

    /// Adds `value` to one series, creating it when unseen.
    fn add(&self, kind: CounterKind, labels: &RequestLabels, value: u64);

    fn increment(&self, kind: CounterKind, labels: &RequestLabels) {
        self.add(kind, labels, 1);
    }

    /// Drops every series of `kind`. Each series sees the reset either before
    /// or after a concurrent increment, never in the middle of one.
    fn reset(&self, kind: CounterKind);

    /// Current value of one series; zero when the series does not exist.
    fn counter_value(&self, kind: CounterKind, labels: &RequestLabels) -> u64;

    fn counter_snapshot(&self, kind: CounterKind) -> Vec<(RequestLabels, u64)>;

    /// Number of samples observed for one duration series.
    fn duration_count(&self, labels: &DurationLabels) -> u64;

    fn scrape(&self, format: ExpositionFormat) -> MetricsResult<Exposition>;
}
