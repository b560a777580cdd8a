use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::error;

use crate::collector::ExpositionFormat;
use crate::extract;
use crate::metrics::{PendingRequest, RequestMetrics};

/// Times the downstream handler and records the request once the response
/// is ready. Recording never alters or delays the response.
pub async fn track_requests(
    State(metrics): State<RequestMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let endpoint = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().as_str().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract::client_ip(request.headers(), peer, metrics.client_ip_header());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;

    metrics.spawn_record(PendingRequest {
        endpoint,
        method,
        status: response.status().as_u16(),
        ip,
        user_agent,
        elapsed: started.elapsed(),
    });
    response
}

pub async fn scrape_handler(
    State(metrics): State<RequestMetrics>,
    headers: HeaderMap,
) -> Response {
    let format =
        ExpositionFormat::negotiate(headers.get(ACCEPT).and_then(|value| value.to_str().ok()));
    match metrics.collector().scrape(format) {
        Ok(exposition) => (
            [(CONTENT_TYPE, exposition.content_type)],
            exposition.body,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "failed to encode prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
