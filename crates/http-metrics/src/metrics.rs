//! The wired-up request instrumentation.
//!
//! [`RequestMetrics`] can only be obtained through
//! [`RequestMetricsBuilder::build`], which registers the instruments and
//! restores persisted counters before returning. A router wrapped by it can
//! therefore never count a request on top of unrestored counters.

use axum::http::HeaderName;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use crawler_detect::{CrawlerClassifier, UserAgentClassifier};
use geo_lookup::{CachedLocator, GeoLocator, IpApiLocator};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::collector::MetricsCollector;
use crate::config::MetricsConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::extract;
use crate::labels::{CounterKind, Instrument, Observation};
use crate::middleware::{scrape_handler, track_requests};
use crate::prometheus_collector::PrometheusCollector;
use crate::restore::{self, CounterSource, PrometheusQueryClient, RestoreReport};
use crate::rollover::{Clock, RolloverHandle, RolloverScheduler, SystemClock};

/// A request that has been answered but not yet recorded.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub ip: String,
    pub user_agent: String,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct RequestMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    app: String,
    client_ip_header: HeaderName,
    collector: Arc<dyn MetricsCollector>,
    locator: Arc<dyn GeoLocator>,
    classifier: Arc<dyn CrawlerClassifier>,
    recordings: TaskTracker,
    restored: Vec<RestoreReport>,
}

pub struct RequestMetricsBuilder {
    config: MetricsConfig,
    collector: Option<Arc<dyn MetricsCollector>>,
    locator: Option<Arc<dyn GeoLocator>>,
    classifier: Option<Arc<dyn CrawlerClassifier>>,
    source: Option<Arc<dyn CounterSource>>,
}

impl RequestMetricsBuilder {
    pub fn collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn CrawlerClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Overrides the backend counters are restored from. Without one, the
    /// configured Prometheus host is used, if any.
    pub fn source(mut self, source: Arc<dyn CounterSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn build(self) -> MetricsResult<RequestMetrics> {
        let Self {
            config,
            collector,
            locator,
            classifier,
            source,
        } = self;

        let client_ip_header = HeaderName::from_bytes(config.client_ip_header.as_bytes())
            .map_err(|err| {
                MetricsError::InvalidConfig(format!(
                    "client ip header {:?}: {err}",
                    config.client_ip_header
                ))
            })?;

        let collector = collector.unwrap_or_else(|| Arc::new(PrometheusCollector::new()));
        for instrument in Instrument::ALL {
            collector.register(instrument)?;
            info!(
                name = instrument.name(),
                metric_type = instrument.kind_name(),
                "registered new metric"
            );
        }

        let source = match source {
            Some(source) => Some(source),
            None if config.restoration_enabled() => {
                Some(Arc::new(PrometheusQueryClient::new(&config)?) as Arc<dyn CounterSource>)
            }
            None => None,
        };
        let restored = match source {
            Some(source) => {
                restore::restore_counters(collector.as_ref(), source.as_ref(), &config.app).await
            }
            None => {
                info!(app = %config.app, "no metrics backend configured, counters start empty");
                restore::skipped()
            }
        };

        let locator = match locator {
            Some(locator) => locator,
            None => Arc::new(CachedLocator::with_defaults(IpApiLocator::with_defaults()?)),
        };
        let classifier =
            classifier.unwrap_or_else(|| Arc::new(UserAgentClassifier::new()));

        Ok(RequestMetrics {
            inner: Arc::new(Inner {
                app: config.app,
                client_ip_header,
                collector,
                locator,
                classifier,
                recordings: TaskTracker::new(),
                restored,
            }),
        })
    }
}

impl RequestMetrics {
    pub fn builder(config: MetricsConfig) -> RequestMetricsBuilder {
        RequestMetricsBuilder {
            config,
            collector: None,
            locator: None,
            classifier: None,
            source: None,
        }
    }

    pub fn app(&self) -> &str {
        &self.inner.app
    }

    pub fn client_ip_header(&self) -> &HeaderName {
        &self.inner.client_ip_header
    }

    pub fn collector(&self) -> Arc<dyn MetricsCollector> {
        self.inner.collector.clone()
    }

    pub fn classifier(&self) -> Arc<dyn CrawlerClassifier> {
        self.inner.classifier.clone()
    }

    /// Outcome of the startup restoration, one entry per counter kind.
    pub fn restored(&self) -> &[RestoreReport] {
        &self.inner.restored
    }

    /// Classifies and geolocates a finished request, then records it.
    pub async fn record(&self, request: PendingRequest) -> Observation {
        let crawler = extract::is_crawler(self.inner.classifier.as_ref(), &request.user_agent);
        let (latitude, longitude, country) =
            extract::geolocate(self.inner.locator.as_ref(), &request.ip)
                .await
                .into_parts();
        let observation = Observation {
            endpoint: request.endpoint,
            method: request.method,
            status: request.status,
            ip: request.ip,
            latitude,
            longitude,
            country,
            crawler,
            duration: request.elapsed,
        };
        self.observe(&observation);
        observation
    }

    pub fn observe(&self, observation: &Observation) {
        let app = self.app();
        self.inner
            .collector
            .observe_duration(&observation.duration_labels(app), observation.duration_ms());
        let labels = observation.request_labels(app);
        self.inner.collector.increment(CounterKind::Daily, &labels);
        self.inner.collector.increment(CounterKind::Monthly, &labels);
    }

    /// Records in the background so the response is not held up by the
    /// geolocation round trip.
    pub fn spawn_record(&self, request: PendingRequest) {
        let metrics = self.clone();
        self.inner.recordings.spawn(async move {
            metrics.record(request).await;
        });
    }

    /// Waits for every background recording started so far.
    pub async fn flush(&self) {
        let recordings = &self.inner.recordings;
        recordings.close();
        recordings.wait().await;
        recordings.reopen();
    }

    pub fn spawn_rollover(&self) -> RolloverHandle {
        self.spawn_rollover_with(SystemClock)
    }

    pub fn spawn_rollover_with<C: Clock>(&self, clock: C) -> RolloverHandle {
        RolloverScheduler::spawn(self.collector(), clock)
    }

    /// Instruments every route of `router`.
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self.clone(), track_requests))
    }

    /// `GET /metrics` serving this instance's collector.
    pub fn scrape_router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route("/metrics", get(scrape_handler))
            .with_state(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RestoreError;
    use crate::labels::{DurationLabels, RequestLabels};
    use crate::restore::RestoreOutcome;
    use async_trait::async_trait;
    use geo_lookup::{Location, StaticLocator};

    struct FixedSource(u64);

    #[async_trait]
    impl CounterSource for FixedSource {
        async fn fetch(
            &self,
            kind: CounterKind,
            app: &str,
        ) -> Result<Vec<(RequestLabels, u64)>, RestoreError> {
            if kind == CounterKind::Monthly {
                return Err(RestoreError::Query("monthly unavailable".into()));
            }
            Ok(vec![(labels(app), self.0)])
        }
    }

    fn labels(app: &str) -> RequestLabels {
        RequestLabels {
            app: app.into(),
            endpoint: "/orders".into(),
            method: "GET".into(),
            status: "200".into(),
            ip: "1.1.1.1".into(),
            lat: "-27.476600".into(),
            lon: "153.016600".into(),
            country: "Australia".into(),
            crawler: "false".into(),
        }
    }

    fn locator() -> Arc<dyn GeoLocator> {
        Arc::new(StaticLocator::new().with("1.1.1.1", Location::new(-27.4766, 153.0166, "Australia")))
    }

    fn pending(ip: &str) -> PendingRequest {
        PendingRequest {
            endpoint: "/orders".into(),
            method: "GET".into(),
            status: 200,
            ip: ip.into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0"
                .into(),
            elapsed: Duration::from_millis(12),
        }
    }

    #[tokio::test]
    async fn build_restores_before_returning() {
        let metrics = RequestMetrics::builder(MetricsConfig::new("shop"))
            .locator(locator())
            .source(Arc::new(FixedSource(5)))
            .build()
            .await
            .unwrap();

        assert_eq!(
            metrics.restored()[0].outcome,
            RestoreOutcome::Restored { series: 1, total: 5 }
        );
        assert!(matches!(metrics.restored()[1].outcome, RestoreOutcome::Failed(_)));

        metrics.record(pending("1.1.1.1")).await;
        let collector = metrics.collector();
        assert_eq!(collector.counter_value(CounterKind::Daily, &labels("shop")), 6);
        assert_eq!(collector.counter_value(CounterKind::Monthly, &labels("shop")), 1);
    }

    #[tokio::test]
    async fn without_backend_restoration_is_skipped() {
        let metrics = RequestMetrics::builder(MetricsConfig::new("shop"))
            .locator(locator())
            .build()
            .await
            .unwrap();
        assert!(metrics
            .restored()
            .iter()
            .all(|report| report.outcome == RestoreOutcome::Skipped));
    }

    #[tokio::test]
    async fn unknown_location_is_still_counted() {
        let metrics = RequestMetrics::builder(MetricsConfig::new("shop"))
            .locator(locator())
            .build()
            .await
            .unwrap();

        let observation = metrics.record(pending("127.0.0.1")).await;
        assert_eq!(observation.country, "Unknown");
        assert_eq!(observation.latitude, "");

        let series = RequestLabels {
            ip: "127.0.0.1".into(),
            lat: String::new(),
            lon: String::new(),
            country: "Unknown".into(),
            ..labels("shop")
        };
        let collector = metrics.collector();
        assert_eq!(collector.counter_value(CounterKind::Daily, &series), 1);
        assert_eq!(collector.counter_value(CounterKind::Monthly, &series), 1);
        let durations = DurationLabels {
            app: "shop".into(),
            endpoint: "/orders".into(),
            method: "GET".into(),
            status: "200".into(),
        };
        assert_eq!(collector.duration_count(&durations), 1);
    }

    #[tokio::test]
    async fn crawler_flag_comes_from_classifier() {
        let metrics = RequestMetrics::builder(MetricsConfig::new("shop"))
            .locator(locator())
            .classifier(Arc::new(|_: &str| true))
            .build()
            .await
            .unwrap();
        let observation = metrics.record(pending("1.1.1.1")).await;
        assert!(observation.crawler);
        let series = RequestLabels {
            crawler: "true".into(),
            ..labels("shop")
        };
        assert_eq!(metrics.collector().counter_value(CounterKind::Daily, &series), 1);
    }

    #[tokio::test]
    async fn shared_collector_rejects_second_instance() {
        let collector: Arc<dyn MetricsCollector> = Arc::new(PrometheusCollector::new());
        RequestMetrics::builder(MetricsConfig::new("shop"))
            .collector(collector.clone())
            .locator(locator())
            .build()
            .await
            .unwrap();
        let err = RequestMetrics::builder(MetricsConfig::new("shop"))
            .collector(collector)
            .locator(locator())
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MetricsError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn invalid_header_is_a_config_error() {
        let mut config = MetricsConfig::new("shop");
        config.client_ip_header = "bad header".into();
        let err = RequestMetrics::builder(config)
            .locator(locator())
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MetricsError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn flush_waits_for_background_recordings() {
        let metrics = RequestMetrics::builder(MetricsConfig::new("shop"))
            .locator(locator())
            .build()
            .await
            .unwrap();
        for _ in 0..10 {
            metrics.spawn_record(pending("1.1.1.1"));
        }
        metrics.flush().await;
        assert_eq!(
            metrics.collector().counter_value(CounterKind::Daily, &labels("shop")),
            10
        );
    }
}
