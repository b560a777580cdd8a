use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{GeoError, GeoResult};
use crate::model::Location;
use crate::GeoLocator;

/// Answers from a fixed table; every other address is `NotFound`.
#[derive(Clone, Debug, Default)]
pub struct StaticLocator {
    table: HashMap<String, Location>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: impl Into<String>, location: Location) -> Self {
        self.table.insert(ip.into(), location);
        self
    }
}

#[async_trait]
impl GeoLocator for StaticLocator {
    async fn locate(&self, ip: &str) -> GeoResult<Location> {
        self.table
            .get(ip)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(ip.to_string()))
    }
}
