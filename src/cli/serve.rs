use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use clap::Args;
use geo_lookup::{CachedLocator, GeoLocator, IpApiLocator, StaticLocator};
use http_metrics::{AccessLog, RequestMetrics, RestoreOutcome};
use tracing::{info, warn};

use crate::config::{Config, GeoSettings};
use crate::server::{run_server_with_metrics, ServerOptions};

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Application label attached to every series (overrides metrics.app)
    #[arg(long)]
    pub app: Option<String>,

    /// Skip IP geolocation; every request is labelled with an unknown location
    #[arg(long = "no-geo")]
    pub no_geo: bool,

    /// Do not emit one log line per request
    #[arg(long = "no-access-log")]
    pub no_access_log: bool,
}

pub async fn cmd_serve(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(app) = args.app.clone() {
        config.metrics.app = app;
    }
    if args.no_geo {
        config.geo.enabled = false;
    }

    let metrics = build_metrics(&config).await?;
    for report in metrics.restored() {
        if let RestoreOutcome::Failed(reason) = &report.outcome {
            warn!(kind = %report.kind, %reason, "serving with an empty counter");
        }
    }

    let mut routes = demo_routes();
    if !args.no_access_log {
        let access_log =
            AccessLog::new(metrics.classifier()).client_ip_header(metrics.client_ip_header().clone());
        routes = access_log.wrap(routes);
    }

    info!(bind = %config.server.bind, app = metrics.app(), "starting instrumented server");
    run_server_with_metrics(
        routes,
        metrics,
        ServerOptions {
            bind: config.server.bind,
            shutdown_timeout: config.server.shutdown_timeout(),
        },
    )
    .await
}

/// Builds the instrumentation for `config`, restoring counters on the way.
pub async fn build_metrics(config: &Config) -> Result<RequestMetrics> {
    RequestMetrics::builder(config.metrics.clone())
        .locator(build_locator(&config.geo)?)
        .build()
        .await
        .context("initialising request metrics")
}

pub fn build_locator(settings: &GeoSettings) -> Result<Arc<dyn GeoLocator>> {
    if !settings.enabled {
        info!("geolocation disabled");
        return Ok(Arc::new(StaticLocator::new()));
    }
    let upstream = IpApiLocator::new(&settings.endpoint, settings.timeout())
        .with_context(|| format!("creating geolocation client for {}", settings.endpoint))?;
    Ok(Arc::new(CachedLocator::new(
        upstream,
        settings.cache_capacity,
        settings.cache_ttl(),
    )))
}

/// Routes served by `trafficmeter serve`.
pub fn demo_routes() -> Router {
    Router::new()
        .route("/", get(|| async { "TrafficMeter" }))
        .route("/healthz", get(|| async { "ok" }))
}
