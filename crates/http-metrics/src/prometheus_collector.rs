//! Prometheus adapter for [`MetricsCollector`].
//!
//! The histogram is a stock `HistogramVec`. Counters live in a sharded
//! `CounterStore`: increments hold the shard read guard while they
//! `fetch_add`, resets clear each shard under its write guard, so a reset and
//! an increment on the same series are strictly ordered.

use dashmap::DashMap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{
    histogram_opts, Encoder, HistogramVec, ProtobufEncoder, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collector::{Exposition, ExpositionFormat, MetricsCollector};
use crate::error::{MetricsError, MetricsResult};
use crate::labels::{
    CounterKind, DurationLabels, Instrument, RequestLabels, DURATION_BUCKETS_MS,
    DURATION_LABEL_NAMES, DURATION_METRIC, REQUEST_LABEL_NAMES,
};

#[derive(Clone)]
pub(crate) struct CounterStore {
    inner: Arc<CounterStoreInner>,
}

struct CounterStoreInner {
    kind: CounterKind,
    desc: Desc,
    series: DashMap<Vec<String>, AtomicU64>,
}

impl CounterStore {
    fn new(kind: CounterKind) -> prometheus::Result<Self> {
        let desc = Desc::new(
            kind.metric_name().to_string(),
            kind.help().to_string(),
            REQUEST_LABEL_NAMES.iter().map(|name| name.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Self {
            inner: Arc::new(CounterStoreInner {
                kind,
                desc,
                series: DashMap::new(),
            }),
        })
    }

    fn add(&self, values: Vec<String>, value: u64) {
        if let Some(counter) = self.inner.series.get(&values) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        self.inner
            .series
            .entry(values)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.inner.series.clear();
    }

    fn value(&self, values: &[String]) -> u64 {
        self.inner
            .series
            .get(values)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn snapshot(&self) -> Vec<(Vec<String>, u64)> {
        let mut series: Vec<(Vec<String>, u64)> = self
            .inner
            .series
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        series.sort();
        series
    }
}

impl Collector for CounterStore {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.inner.kind.metric_name().to_string());
        family.set_help(self.inner.kind.help().to_string());
        family.set_field_type(MetricType::COUNTER);

        for (values, value) in self.snapshot() {
            let mut pairs: Vec<LabelPair> = REQUEST_LABEL_NAMES
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.to_string());
                    pair.set_value(value);
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut metric = Metric::default();
            for pair in pairs {
                metric.mut_label().push(pair);
            }
            let mut counter = proto::Counter::default();
            counter.set_value(value as f64);
            metric.set_counter(counter);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

/// [`MetricsCollector`] backed by a `prometheus::Registry`.
pub struct PrometheusCollector {
    registry: Registry,
    durations: HistogramVec,
    daily: CounterStore,
    monthly: CounterStore,
}

impl Default for PrometheusCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusCollector {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Builds the instruments on top of an existing registry. Nothing is
    /// exposed until [`MetricsCollector::register`] is called.
    pub fn with_registry(registry: Registry) -> Self {
        let durations = HistogramVec::new(
            histogram_opts!(
                DURATION_METRIC,
                "Histogram of response time for handler in milliseconds",
                DURATION_BUCKETS_MS.to_vec()
            ),
            &DURATION_LABEL_NAMES,
        )
        .expect("create request duration histogram");
        let daily = CounterStore::new(CounterKind::Daily).expect("create daily request counter");
        let monthly =
            CounterStore::new(CounterKind::Monthly).expect("create monthly request counter");
        Self {
            registry,
            durations,
            daily,
            monthly,
        }
    }

    fn counters(&self, kind: CounterKind) -> &CounterStore {
        match kind {
            CounterKind::Daily => &self.daily,
            CounterKind::Monthly => &self.monthly,
        }
    }
}

impl MetricsCollector for PrometheusCollector {
    fn register(&self, instrument: Instrument) -> MetricsResult<()> {
        let collector: Box<dyn Collector> = match instrument {
            Instrument::Duration => Box::new(self.durations.clone()),
            Instrument::Counter(kind) => Box::new(self.counters(kind).clone()),
        };
        self.registry
            .register(collector)
            .map_err(|err| MetricsError::registration(instrument.name(), err))
    }

    fn observe_duration(&self, labels: &DurationLabels, millis: f64) {
        self.durations
            .with_label_values(&labels.values())
            .observe(millis);
    }

    fn add(&self, kind: CounterKind, labels: &RequestLabels, value: u64) {
        self.counters(kind).add(labels.to_values(), value);
    }

    fn reset(&self, kind: CounterKind) {
        self.counters(kind).reset();
    }

    fn counter_value(&self, kind: CounterKind, labels: &RequestLabels) -> u64 {
        self.counters(kind).value(&labels.to_values())
    }

    fn counter_snapshot(&self, kind: CounterKind) -> Vec<(RequestLabels, u64)> {
        self.counters(kind)
            .snapshot()
            .into_iter()
            .filter_map(|(values, value)| RequestLabels::from_values(&values).map(|l| (l, value)))
            .collect()
    }

    fn duration_count(&self, labels: &DurationLabels) -> u64 {
        let wanted = labels.values();
        let families = self.durations.collect();
        families
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                DURATION_LABEL_NAMES.iter().zip(wanted.iter()).all(|(name, value)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
                })
            })
            .map(|metric| metric.get_histogram().get_sample_count())
            .unwrap_or(0)
    }

    fn scrape(&self, format: ExpositionFormat) -> MetricsResult<Exposition> {
        let families = self.registry.gather();
        match format {
            ExpositionFormat::Text => encode(TextEncoder::new(), &families),
            ExpositionFormat::Protobuf => encode(ProtobufEncoder::new(), &families),
        }
    }
}

fn encode<E: Encoder>(encoder: E, families: &[MetricFamily]) -> MetricsResult<Exposition> {
    let mut body = Vec::new();
    encoder
        .encode(families, &mut body)
        .map_err(|err| MetricsError::Encode(err.to_string()))?;
    Ok(Exposition {
        content_type: encoder.format_type().to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn labels(ip: &str) -> RequestLabels {
        RequestLabels {
            app: "shop".into(),
            endpoint: "/orders".into(),
            method: "GET".into(),
            status: "200".into(),
            ip: ip.into(),
            lat: String::new(),
            lon: String::new(),
            country: "Unknown".into(),
            crawler: "false".into(),
        }
    }

    fn registered() -> PrometheusCollector {
        let collector = PrometheusCollector::new();
        for instrument in Instrument::ALL {
            collector.register(instrument).unwrap();
        }
        collector
    }

    #[test]
    fn concurrent_increments_are_all_counted() {
        let collector = Arc::new(registered());
        let series = labels("1.1.1.1");
        thread::scope(|scope| {
            for _ in 0..8 {
                let collector = collector.clone();
                let series = series.clone();
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        collector.increment(CounterKind::Daily, &series);
                    }
                });
            }
        });
        assert_eq!(collector.counter_value(CounterKind::Daily, &series), 8_000);
    }

    #[test]
    fn reset_only_touches_its_own_kind() {
        let collector = registered();
        for ip in ["1.1.1.1", "8.8.8.8"] {
            collector.increment(CounterKind::Daily, &labels(ip));
            collector.increment(CounterKind::Monthly, &labels(ip));
        }
        collector.reset(CounterKind::Daily);
        assert_eq!(collector.counter_value(CounterKind::Daily, &labels("1.1.1.1")), 0);
        assert_eq!(collector.counter_value(CounterKind::Daily, &labels("8.8.8.8")), 0);
        assert!(collector.counter_snapshot(CounterKind::Daily).is_empty());
        assert_eq!(collector.counter_value(CounterKind::Monthly, &labels("1.1.1.1")), 1);
        assert_eq!(collector.counter_snapshot(CounterKind::Monthly).len(), 2);
    }

    #[test]
    fn increments_after_reset_start_a_new_epoch() {
        let collector = registered();
        let series = labels("1.1.1.1");
        collector.add(CounterKind::Monthly, &series, 500);
        collector.reset(CounterKind::Monthly);
        for _ in 0..3 {
            collector.increment(CounterKind::Monthly, &series);
        }
        assert_eq!(collector.counter_value(CounterKind::Monthly, &series), 3);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let collector = registered();
        let err = collector.register(Instrument::Duration).unwrap_err();
        assert!(matches!(err, MetricsError::AlreadyRegistered(ref name) if name == DURATION_METRIC));

        let shared = Registry::new();
        let first = PrometheusCollector::with_registry(shared.clone());
        let second = PrometheusCollector::with_registry(shared);
        first.register(Instrument::Counter(CounterKind::Daily)).unwrap();
        let err = second
            .register(Instrument::Counter(CounterKind::Daily))
            .unwrap_err();
        assert!(matches!(err, MetricsError::AlreadyRegistered(_)));
    }

    #[test]
    fn text_scrape_contains_every_instrument() {
        let collector = registered();
        let duration = DurationLabels {
            app: "shop".into(),
            endpoint: "/orders".into(),
            method: "GET".into(),
            status: "200".into(),
        };
        collector.observe_duration(&duration, 42.0);
        collector.increment(CounterKind::Daily, &labels("1.1.1.1"));
        collector.increment(CounterKind::Monthly, &labels("1.1.1.1"));

        let exposition = collector.scrape(ExpositionFormat::Text).unwrap();
        assert!(exposition.content_type.starts_with("text/plain"));
        let body = String::from_utf8(exposition.body).unwrap();
        assert!(body.contains("# TYPE http_server_request_duration_milliseconds histogram"));
        assert!(body.contains("le=\"30000\""));
        assert!(body.contains("# TYPE http_server_request_count_daily counter"));
        assert!(body.contains(
            "http_server_request_count_monthly{app=\"shop\",country=\"Unknown\",crawler=\"false\",endpoint=\"/orders\",ip=\"1.1.1.1\",lat=\"\",lon=\"\",method=\"GET\",status=\"200\"} 1"
        ));
        assert_eq!(collector.duration_count(&duration), 1);
    }

    #[test]
    fn protobuf_scrape_uses_delimited_content_type() {
        let collector = registered();
        collector.increment(CounterKind::Daily, &labels("1.1.1.1"));
        let exposition = collector.scrape(ExpositionFormat::Protobuf).unwrap();
        assert!(exposition.content_type.contains("application/vnd.google.protobuf"));
        assert!(!exposition.body.is_empty());
    }

    #[test]
    fn unknown_duration_series_counts_zero() {
        let collector = registered();
        assert_eq!(collector.duration_count(&DurationLabels::default()), 0);
    }
}
