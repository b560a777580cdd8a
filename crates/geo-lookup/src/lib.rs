//! IP geolocation collaborator.
//!
//! `GeoLocator` is the seam the request metrics depend on; `IpApiLocator`
//! talks to ip-api.com, `CachedLocator` puts a bounded TTL cache in front of
//! any locator and `StaticLocator` answers from a fixed table.

pub mod cache;
pub mod error;
pub mod fixed;
pub mod ip_api;
pub mod model;

use async_trait::async_trait;
use std::sync::Arc;

pub use cache::CachedLocator;
pub use error::{GeoError, GeoResult};
pub use fixed::StaticLocator;
pub use ip_api::{IpApiLocator, DEFAULT_IP_API_ENDPOINT};
pub use model::Location;

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: &str) -> GeoResult<Location>;
}

#[async_trait]
impl<T: GeoLocator + ?Sized> GeoLocator for Arc<T> {
    async fn locate(&self, ip: &str) -> GeoResult<Location> {
        (**self).locate(ip).await
    }
}
