//! One structured log line per incoming request.

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderName;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use crawler_detect::{CrawlerClassifier, UserAgentClassifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::extract::{self, DEFAULT_CLIENT_IP_HEADER};

/// Extra `(key, value)` pair derived from the request.
pub type ExtraField = Arc<dyn Fn(&Request) -> (String, String) + Send + Sync>;

#[derive(Clone)]
pub struct AccessLog {
    classifier: Arc<dyn CrawlerClassifier>,
    client_ip_header: HeaderName,
    extras: Vec<ExtraField>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessEntry {
    pub endpoint: String,
    pub method: String,
    pub ip: String,
    pub crawler: bool,
    pub extras: Vec<(String, String)>,
}

impl AccessEntry {
    fn extras_field(&self) -> String {
        self.extras
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(Arc::new(UserAgentClassifier::new()))
    }
}

impl AccessLog {
    pub fn new(classifier: Arc<dyn CrawlerClassifier>) -> Self {
        Self {
            classifier,
            client_ip_header: HeaderName::from_static(DEFAULT_CLIENT_IP_HEADER),
            extras: Vec::new(),
        }
    }

    pub fn client_ip_header(mut self, header: HeaderName) -> Self {
        self.client_ip_header = header;
        self
    }

    pub fn extra(mut self, field: ExtraField) -> Self {
        self.extras.push(field);
        self
    }

    pub fn describe(&self, request: &Request) -> AccessEntry {
        let endpoint = request
            .extensions()
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.to_string())
            .unwrap_or_else(|| request.uri().to_string());
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        AccessEntry {
            endpoint,
            method: request.method().to_string(),
            ip: extract::client_ip(request.headers(), peer, &self.client_ip_header),
            crawler: extract::is_crawler(self.classifier.as_ref(), user_agent),
            extras: self.extras.iter().map(|field| field(request)).collect(),
        }
    }

    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self.clone(), log_requests))
    }
}

pub async fn log_requests(State(log): State<AccessLog>, request: Request, next: Next) -> Response {
    let entry = log.describe(&request);
    info!(
        endpoint = %entry.endpoint,
        method = %entry.method,
        ip = %entry.ip,
        crawler = entry.crawler,
        extra = %entry.extras_field(),
        "got request"
    );
    next.run(request).await
}
