use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use geo_lookup::{Location, StaticLocator};
use http_metrics::{CounterKind, MetricsConfig, RequestLabels, RequestMetrics};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use trafficmeter_cli::cli::serve::demo_routes;
use trafficmeter_cli::server::{build_router, serve_until};

async fn metrics(locator: StaticLocator) -> RequestMetrics {
    RequestMetrics::builder(MetricsConfig::new("smoke"))
        .locator(Arc::new(locator))
        .build()
        .await
        .unwrap()
}

fn healthz_labels(ip: &str, lat: &str, lon: &str, country: &str) -> RequestLabels {
    RequestLabels {
        app: "smoke".into(),
        endpoint: "/healthz".into(),
        method: "GET".into(),
        status: "200".into(),
        ip: ip.into(),
        lat: lat.into(),
        lon: lon.into(),
        country: country.into(),
        crawler: "false".into(),
    }
}

#[tokio::test]
async fn instrumented_router_exposes_its_own_requests() {
    let metrics = metrics(
        StaticLocator::new().with("9.9.9.9", Location::new(47.3769, 8.5417, "Switzerland")),
    )
    .await;
    let router = build_router(demo_routes(), &metrics);

    let mut request = Request::builder()
        .uri("/healthz")
        .header("user-agent", "Mozilla/5.0 Firefox/126.0")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo::<SocketAddr>("9.9.9.9:50000".parse().unwrap()));
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    metrics.flush().await;

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("http_server_request_count_daily{app=\"smoke\",country=\"Switzerland\""));
    assert!(text.contains("lat=\"47.376900\""));
    assert!(text.contains("http_server_request_duration_milliseconds_count{app=\"smoke\",endpoint=\"/healthz\",method=\"GET\",status=\"200\"} 1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_server_records_peer_address_and_shuts_down() {
    let metrics = metrics(StaticLocator::new()).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve_until(
        listener,
        demo_routes(),
        metrics.clone(),
        Duration::from_secs(2),
        shutdown.clone(),
    ));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200 OK"));

    shutdown.cancel();
    server.await.unwrap().unwrap();

    let labels = healthz_labels("127.0.0.1", "", "", "Unknown");
    let collector = metrics.collector();
    assert_eq!(collector.counter_value(CounterKind::Daily, &labels), 1);
    assert_eq!(collector.counter_value(CounterKind::Monthly, &labels), 1);
}
