//! Request metadata used as labels: client address, crawler flag and
//! geolocation. None of these can fail from the caller's point of view.

use axum::http::{HeaderMap, HeaderName};
use crawler_detect::CrawlerClassifier;
use geo_lookup::GeoLocator;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use crate::labels::GeoLabels;

pub const DEFAULT_CLIENT_IP_HEADER: &str = "x-forwarded-for";

/// Client address for labelling.
///
/// The first entry of the trusted forwarding header wins; otherwise the host
/// part of the peer address. The header is not authenticated, so any client
/// reaching the service directly can put an arbitrary value there.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, header: &HeaderName) -> String {
    let forwarded = headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').map(str::trim).find(|part| !part.is_empty()));

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}

pub fn is_crawler(classifier: &dyn CrawlerClassifier, user_agent: &str) -> bool {
    classifier.is_crawler(user_agent)
}

/// Looks `ip` up and turns the answer into labels. Values that are not an
/// IP address never reach the locator; they and lookup errors are reported
/// as [`GeoLabels::NotFound`]. The locator logs its own failures.
pub async fn geolocate(locator: &dyn GeoLocator, ip: &str) -> GeoLabels {
    if ip.is_empty() {
        debug!("no client address to geolocate");
        return GeoLabels::NotFound;
    }
    if ip.parse::<IpAddr>().is_err() {
        debug!(%ip, "client address is not an IP, skipping geolocation");
        return GeoLabels::NotFound;
    }
    match locator.locate(ip).await {
        Ok(location) => GeoLabels::from_location(&location),
        Err(err) => {
            debug!(%ip, %err, "failed to get location");
            GeoLabels::NotFound
        }
    }
}
