use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::http::HttpClient;
use super::{base_url, parse_timestamp, RegistryClient};
use crate::cache::RunCache;
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};

/// The part of an npm packument we need: version -> publish time.
#[derive(Deserialize)]
struct Packument {
    #[serde(default)]
    time: HashMap<String, String>,
}

pub struct NpmClient {
    http: Arc<HttpClient>,
    base_url: String,
    packuments: RunCache<Arc<HashMap<String, String>>>,
}

impl NpmClient {
    pub fn new(http: Arc<HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            base_url: base_url(endpoint),
            packuments: RunCache::new(),
        }
    }

    fn url(&self, package: &PackageRecord) -> String {
        format!("{}/{}", self.base_url, package.id())
    }

    /// One packument holds every version, so it is fetched once per package.
    async fn publish_times(&self, package: &PackageRecord) -> Result<Arc<HashMap<String, String>>> {
        let id = package.id();
        if let Some(times) = self.packuments.get(&id) {
            return Ok(times);
        }

        let url = self.url(package);
        debug!(package = %id, %url, "Fetching npm metadata");
        let packument: Packument = self.http.get_json(&url).await?;

        let times = Arc::new(packument.time);
        self.packuments.insert(id, Arc::clone(&times));
        Ok(times)
    }
}

#[async_trait]
impl RegistryClient for NpmClient {
    fn registry(&self) -> Registry {
        Registry::Npm
    }

    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>> {
        let times = self.publish_times(package).await?;
        let context = format!(
            "{} version {} at {}",
            package.id(),
            package.version(),
            self.url(package)
        );

        let published_at = times
            .get(package.version())
            .ok_or_else(|| Error::Lookup(format!("No publish time found for {}", context)))?;

        parse_timestamp(published_at, &context)
    }
}
