use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::GeoResult;
use crate::model::Location;
use crate::GeoLocator;

pub const DEFAULT_CACHE_CAPACITY: usize = 4_096;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);

#[derive(Clone, Debug)]
struct CacheEntry {
    location: Location,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Bounded IP → location cache in front of another locator.
///
/// Only successful lookups are stored. An entry older than the TTL is dropped
/// on access and looked up again, so a hit is never older than the TTL.
/// Concurrent misses for the same address share one upstream lookup.
pub struct CachedLocator<L> {
    inner: L,
    entries: Mutex<LruCache<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    ttl: Duration,
}

impl<L: GeoLocator> CachedLocator<L> {
    pub fn new(inner: L, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn with_defaults(inner: L) -> Self {
        Self::new(inner, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn lookup_fresh(&self, ip: &str) -> Option<Location> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let cached = entries
            .get(ip)
            .map(|entry| entry.is_fresh(now, self.ttl).then(|| entry.location.clone()));
        match cached {
            Some(Some(location)) => Some(location),
            Some(None) => {
                entries.pop(ip);
                debug!(%ip, "geolocation cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Drops the per-address gate once nobody but the map and `gate` hold it.
    fn release(&self, ip: &str, gate: Arc<AsyncMutex<()>>) {
        let mut inflight = self.inflight.lock();
        if Arc::strong_count(&gate) <= 2 {
            inflight.remove(ip);
        }
    }

    async fn fetch(&self, ip: &str) -> GeoResult<Location> {
        let location = self.inner.locate(ip).await?;
        self.entries.lock().put(
            ip.to_string(),
            CacheEntry {
                location: location.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(location)
    }
}

#[async_trait]
impl<L: GeoLocator> GeoLocator for CachedLocator<L> {
    async fn locate(&self, ip: &str) -> GeoResult<Location> {
        if let Some(location) = self.lookup_fresh(ip) {
            return Ok(location);
        }

        let gate = self
            .inflight
            .lock()
            .entry(ip.to_string())
            .or_default()
            .clone();
        let result = {
            let _turn = gate.lock().await;
            match self.lookup_fresh(ip) {
                Some(location) => Ok(location),
                None => self.fetch(ip).await,
            }
        };
        self.release(ip, gate);
        result
    }
}
