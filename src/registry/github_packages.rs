use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::http::HttpClient;
use super::{base_url, parse_timestamp, RegistryClient};
use crate::cache::RunCache;
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};

#[derive(Deserialize)]
struct PackageVersion {
    name: String,
    created_at: Option<String>,
}

/// Looks up versions of packages hosted on GitHub Packages.
///
/// Listing package versions needs a token with the `read:packages` scope,
/// even for public packages.
pub struct GithubPackagesClient {
    http: Arc<HttpClient>,
    api_url: String,
    versions: RunCache<DateTime<Utc>>,
}

impl GithubPackagesClient {
    pub fn new(http: Arc<HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            api_url: base_url(endpoint),
            versions: RunCache::new(),
        }
    }
}

#[async_trait]
impl RegistryClient for GithubPackagesClient {
    fn registry(&self) -> Registry {
        Registry::GithubPackages
    }

    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>> {
        let org = package.scope().ok_or_else(|| {
            Error::InvalidPackage(format!(
                "Package scope is required for GitHub Packages: {} ({})",
                package.id(),
                package.manifest_path()
            ))
        })?;

        let key = format!("{}@{}", package.id(), package.version());
        if let Some(published) = self.versions.get(&key) {
            return Ok(published);
        }

        // npm:1.2.3 or container:sha256:abc123
        let (package_type, version) = package.version().split_once(':').ok_or_else(|| {
            Error::InvalidPackage(format!(
                "Invalid package version for GitHub Packages: {} ({})",
                package.version(),
                package.id()
            ))
        })?;

        let url = format!(
            "{}/orgs/{}/packages/{}/{}/versions",
            self.api_url,
            org,
            package_type,
            package.name()
        );
        debug!(package = %package.id(), version, %url, "Listing GitHub package versions");
        let listed: Vec<PackageVersion> = self.http.github_paginated(&url, true).await?;

        let found = listed.iter().find(|v| v.name == version).ok_or_else(|| {
            Error::Lookup(format!(
                "Version {} not found for {} (searched {} versions)",
                version,
                url,
                listed.len()
            ))
        })?;

        let created_at = found
            .created_at
            .as_deref()
            .ok_or_else(|| Error::Lookup(format!("No created_at found for {}", url)))?;

        let published = parse_timestamp(created_at, &url)?;
        self.versions.insert(key, published);
        Ok(published)
    }
}
