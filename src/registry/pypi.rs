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
struct Release {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Deserialize)]
struct ReleaseFile {
    upload_time_iso_8601: Option<String>,
}

pub struct PypiClient {
    http: Arc<HttpClient>,
    base_url: String,
    releases: RunCache<DateTime<Utc>>,
}

impl PypiClient {
    pub fn new(http: Arc<HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            base_url: base_url(endpoint),
            releases: RunCache::new(),
        }
    }
}

#[async_trait]
impl RegistryClient for PypiClient {
    fn registry(&self) -> Registry {
        Registry::Pypi
    }

    /// Wheels and the sdist of a release are uploaded one by one, so the
    /// release counts as published when its last file landed.
    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>> {
        let key = format!("{}@{}", package.id(), package.version());
        if let Some(published) = self.releases.get(&key) {
            return Ok(published);
        }

        let url = format!(
            "{}/pypi/{}/{}/json",
            self.base_url,
            package.name(),
            package.version()
        );
        debug!(package = package.name(), version = package.version(), %url, "Fetching PyPI release");
        let release: Release = self.http.get_json(&url).await?;

        let context = format!("{} version {} at {}", package.name(), package.version(), url);
        if release.urls.is_empty() {
            return Err(Error::Lookup(format!(
                "No uploaded package URLs found in metadata of {}",
                context
            )));
        }

        let mut latest: Option<DateTime<Utc>> = None;
        for file in &release.urls {
            let raw = file.upload_time_iso_8601.as_deref().ok_or_else(|| {
                Error::Lookup(format!(
                    "No upload_time_iso_8601 found in one of the files of {}",
                    context
                ))
            })?;
            let uploaded = parse_timestamp(raw, &context)?;
            latest = Some(latest.map_or(uploaded, |t| t.max(uploaded)));
        }

        let published = latest.ok_or_else(|| Error::Lookup(format!("No upload time for {}", context)))?;
        self.releases.insert(key, published);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use mockito::Server;

    fn client(server: &Server) -> PypiClient {
        let http = HttpClient::new(&HttpSettings::default(), None).unwrap();
        PypiClient::new(Arc::new(http), &server.url())
    }

    fn package(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(None, name, version, "Pipfile.lock", Registry::Pypi).unwrap()
    }

    #[tokio::test]
    async fn test_latest_upload_wins() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/requests/2.32.3/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {"name": "requests"}, "urls": [
                    {"filename": "requests-2.32.3-py3-none-any.whl", "upload_time_iso_8601": "2024-05-29T15:37:47.027Z"},
                    {"filename": "requests-2.32.3.tar.gz", "upload_time_iso_8601": "2024-05-29T15:37:49.536Z"}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let pypi = client(&server);
        let t = pypi.publish_time(&package("requests", "2.32.3")).await.unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-29T15:37:49.536+00:00");

        // cached per version
        pypi.publish_time(&package("requests", "2.32.3")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_release_without_files_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/pypi/yanked/1.0.0/json")
            .with_status(200)
            .with_body(r#"{"urls": []}"#)
            .create_async()
            .await;

        let err = client(&server)
            .publish_time(&package("yanked", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
    }

    #[tokio::test]
    async fn test_file_without_upload_time_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/pypi/odd/0.1/json")
            .with_status(200)
            .with_body(r#"{"urls": [{"filename": "odd-0.1.tar.gz"}]}"#)
            .create_async()
            .await;

        assert!(client(&server)
            .publish_time(&package("odd", "0.1"))
            .await
            .is_err());
    }
}
