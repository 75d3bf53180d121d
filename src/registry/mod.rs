//! Registry clients.
//!
//! A [`RegistryClient`] answers one question: when was this exact version of
//! a package published? Each supported [`Registry`] has one client, and the
//! clients of a run are bundled in a [`RegistrySet`].
//!
//! # Supported Registries
//!
//! | Registry | Endpoint | Cached per |
//! |----------|----------|------------|
//! | npm | `GET {npm}/{scope/name}` (`time` map) | package |
//! | PyPI | `GET {pypi}/pypi/{name}/{version}/json` (latest upload) | package version |
//! | RubyGems | `GET {rubygems}/api/v1/versions/{name}.json` | package |
//! | GitHub Packages | `GET {api}/orgs/{org}/packages/{type}/{name}/versions` | package version |
//! | GitHub repositories | `GET {api}/repos/{owner}/{repo}/commits/{sha}` | package version |
//!
//! A `RegistrySet` owns every cache of the run. Dropping it discards them, so
//! two scans in one process never share lookups.

mod github_packages;
mod github_repositories;
pub mod http;
mod npm;
mod pypi;
mod rubygems;

pub use github_packages::GithubPackagesClient;
pub use github_repositories::GithubRepositoriesClient;
pub use npm::NpmClient;
pub use pypi::PypiClient;
pub use rubygems::RubygemsClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};
use http::HttpClient;

/// Trait for looking up publish times in one registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// The registry this client serves.
    fn registry(&self) -> Registry;

    /// Returns the publish time of `package`'s version.
    ///
    /// # Errors
    ///
    /// Fails if the registry cannot be reached, or if it does not know the
    /// package or version.
    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>>;
}

/// The registry clients of one scan.
pub struct RegistrySet {
    clients: HashMap<Registry, Arc<dyn RegistryClient>>,
}

impl RegistrySet {
    /// Builds a client for every registry, sharing one HTTP client.
    pub fn new(config: &Config) -> Result<Self> {
        let http = Arc::new(HttpClient::new(&config.http, config.github_token.clone())?);
        let endpoints = &config.endpoints;

        Ok(Self::with_clients(vec![
            Arc::new(NpmClient::new(Arc::clone(&http), &endpoints.npm)),
            Arc::new(PypiClient::new(Arc::clone(&http), &endpoints.pypi)),
            Arc::new(RubygemsClient::new(Arc::clone(&http), &endpoints.rubygems)),
            Arc::new(GithubPackagesClient::new(
                Arc::clone(&http),
                &endpoints.github_api,
            )),
            Arc::new(GithubRepositoriesClient::new(http, &endpoints.github_api)),
        ]))
    }

    /// Builds a set from explicit clients. A later client for the same
    /// registry replaces an earlier one.
    pub fn with_clients(clients: Vec<Arc<dyn RegistryClient>>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.registry(), client))
            .collect();
        Self { clients }
    }

    pub fn client(&self, registry: Registry) -> Result<Arc<dyn RegistryClient>> {
        self.clients
            .get(&registry)
            .cloned()
            .ok_or_else(|| Error::Lookup(format!("No client configured for registry {}", registry)))
    }
}

/// Parses an ISO 8601 / RFC 3339 timestamp from a registry response.
pub(crate) fn parse_timestamp(raw: &str, context: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::Lookup(format!("Invalid timestamp for {}: {}", context, raw)))
}

pub(crate) fn base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_keeps_milliseconds() {
        let t = parse_timestamp("2021-02-14T12:30:00.250Z", "lodash").unwrap();
        assert_eq!(t.timestamp_millis() % 1000, 250);

        let offset = parse_timestamp("2011-04-14T18:00:49+02:00", "x").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2011, 4, 14, 16, 0, 49).unwrap());

        assert!(matches!(
            parse_timestamp("yesterday", "lodash"),
            Err(Error::Lookup(_))
        ));
    }

    #[test]
    fn test_default_set_has_every_registry() {
        let set = RegistrySet::new(&Config::default()).unwrap();
        for registry in Registry::ALL {
            assert_eq!(set.client(registry).unwrap().registry(), registry);
        }
    }

    #[test]
    fn test_with_clients_only_knows_given_registries() {
        let http = Arc::new(HttpClient::new(&Default::default(), None).unwrap());
        let set = RegistrySet::with_clients(vec![Arc::new(NpmClient::new(
            http,
            "https://registry.npmjs.org/",
        ))]);
        assert!(set.client(Registry::Npm).is_ok());
        assert!(set.client(Registry::Pypi).is_err());
    }
}
