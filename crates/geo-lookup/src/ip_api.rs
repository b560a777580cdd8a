use async_trait::async_trait;
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tracing::error;

use crate::error::{GeoError, GeoResult};
use crate::model::Location;
use crate::GeoLocator;

pub const DEFAULT_IP_API_ENDPOINT: &str = "http://ip-api.com/json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for the ip-api.com JSON endpoint (`GET {endpoint}/{ip}`).
#[derive(Clone, Debug)]
pub struct IpApiLocator {
    client: Client,
    endpoint: String,
}

impl IpApiLocator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> GeoResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn with_defaults() -> GeoResult<Self> {
        Self::new(DEFAULT_IP_API_ENDPOINT, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: &str) -> GeoResult<Location> {
        // The address becomes a path segment, so anything else is refused.
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| GeoError::InvalidAddress(ip.to_string()))?;
        let url = format!("{}/{}", self.endpoint, addr);
        let response = self.client.get(&url).send().await.map_err(|err| {
            error!(source = %self.endpoint, method = "GET", %err, "failed to get location data");
            GeoError::from(err)
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(source = %self.endpoint, status = status.as_u16(), %body, "geolocation service rejected request");
            return Err(GeoError::Status(status.as_u16()));
        }

        let location: Location = serde_json::from_str(&body).map_err(|err| {
            error!(source = %self.endpoint, %body, %err, "failed to parse location response");
            GeoError::from(err)
        })?;
        if !location.is_success() {
            let reason = location
                .message
                .clone()
                .unwrap_or_else(|| format!("status {:?}", location.status));
            error!(source = %self.endpoint, %ip, %reason, "geolocation lookup unsuccessful");
            return Err(GeoError::Lookup {
                ip: ip.to_string(),
                reason,
            });
        }

        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn ip_api_stub(Path(ip): Path<String>) -> axum::response::Response {
        match ip.as_str() {
            "1.1.1.1" => (
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                r#"{"status":"success","country":"Australia","countryCode":"AU","lat":-27.4766,"lon":153.0166,"isp":"Cloudflare, Inc","org":"APNIC","as":"AS13335 Cloudflare, Inc.","query":"1.1.1.1"}"#,
            )
                .into_response(),
            "192.0.2.1" => "not json".into_response(),
            "192.0.2.2" => StatusCode::TOO_MANY_REQUESTS.into_response(),
            _ => r#"{"status":"fail","message":"reserved range","query":"127.0.0.1"}"#
                .into_response(),
        }
    }

    async fn spawn_stub() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/json/:ip", get(ip_api_stub));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/json")
    }

    #[tokio::test]
    async fn resolves_successful_lookup() {
        let locator = IpApiLocator::new(spawn_stub().await, Duration::from_secs(2)).unwrap();
        let location = locator.locate("1.1.1.1").await.unwrap();
        assert_eq!(location.country, "Australia");
        assert!(location.isp.contains("Cloudflare"));
        assert!((location.lat + 27.4766).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unsuccessful_status_is_an_error() {
        let locator = IpApiLocator::new(spawn_stub().await, Duration::from_secs(2)).unwrap();
        let err = locator.locate("127.0.0.1").await.unwrap_err();
        assert!(matches!(err, GeoError::Lookup { ref reason, .. } if reason == "reserved range"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let locator = IpApiLocator::new(spawn_stub().await, Duration::from_secs(2)).unwrap();
        let err = locator.locate("192.0.2.1").await.unwrap_err();
        assert!(matches!(err, GeoError::Decode(_)));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let locator = IpApiLocator::new(spawn_stub().await, Duration::from_secs(2)).unwrap();
        let err = locator.locate("192.0.2.2").await.unwrap_err();
        assert!(matches!(err, GeoError::Status(429)));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let locator = IpApiLocator::new("http://127.0.0.1:1/json", Duration::from_millis(500)).unwrap();
        let err = locator.locate("1.1.1.1").await.unwrap_err();
        assert!(matches!(err, GeoError::Http(_)));
    }

    #[tokio::test]
    async fn non_address_input_never_reaches_the_service() {
        let locator = IpApiLocator::new("http://127.0.0.1:1/json", Duration::from_millis(500)).unwrap();
        for input in ["1.1.1.1/../../batch?fields=all", "evil.example", "1.1.1.1 "] {
            let err = locator.locate(input).await.unwrap_err();
            assert!(matches!(err, GeoError::InvalidAddress(ref raw) if raw == input));
        }
    }
}
