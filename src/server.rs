//! HTTP server hosting an instrumented router.

use anyhow::{Context, Result};
use axum::Router;
use http_metrics::RequestMetrics;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: SocketAddr,
    pub shutdown_timeout: Duration,
}

/// `router` with every route instrumented, plus `GET /metrics`.
pub fn build_router(router: Router, metrics: &RequestMetrics) -> Router {
    metrics
        .wrap(router)
        .merge(metrics.scrape_router())
        .layer(TraceLayer::new_for_http())
}

/// Serves until SIGINT, SIGTERM or SIGHUP.
pub async fn run_server_with_metrics(
    router: Router,
    metrics: RequestMetrics,
    options: ServerOptions,
) -> Result<()> {
    let listener = TcpListener::bind(options.bind)
        .await
        .with_context(|| format!("binding {}", options.bind))?;
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    serve_until(listener, router, metrics, options.shutdown_timeout, shutdown).await
}

/// Serves on `listener` until `shutdown` is cancelled, then drains open
/// connections for at most `drain_timeout`, stops the rollover scheduler and
/// waits for pending recordings.
pub async fn serve_until(
    listener: TcpListener,
    router: Router,
    metrics: RequestMetrics,
    drain_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    let rollover = metrics.spawn_rollover();
    let app = build_router(router, &metrics);
    info!(%addr, app = metrics.app(), "http server listening");

    let graceful = shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { graceful.cancelled().await })
    .into_future();
    let deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result.context("http server failed")?,
        _ = deadline => warn!(timeout = ?drain_timeout, "shutdown timed out, dropping open connections"),
    }

    rollover.shutdown().await;
    if tokio::time::timeout(drain_timeout, metrics.flush()).await.is_err() {
        warn!("pending request recordings were not flushed in time");
    }
    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = unix_signal(UnixSignal::Terminate) => info!("received SIGTERM, shutting down"),
        _ = unix_signal(UnixSignal::Hangup) => info!("received SIGHUP, shutting down"),
    }
}

enum UnixSignal {
    Terminate,
    Hangup,
}

#[cfg(unix)]
async fn unix_signal(which: UnixSignal) {
    use tokio::signal::unix::{signal, SignalKind};

    let kind = match which {
        UnixSignal::Terminate => SignalKind::terminate(),
        UnixSignal::Hangup => SignalKind::hangup(),
    };
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(%err, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn unix_signal(_which: UnixSignal) {
    std::future::pending::<()>().await;
}
