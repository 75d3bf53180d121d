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

#[derive(Debug, Clone, Deserialize)]
struct GemVersion {
    number: String,
    #[serde(default)]
    platform: Option<String>,
    created_at: Option<String>,
}

impl GemVersion {
    /// Lock files name platform gems `<number>-<platform>`.
    fn matches(&self, version: &str) -> bool {
        if self.number == version {
            return true;
        }
        match &self.platform {
            Some(platform) => version
                .strip_prefix(self.number.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                == Some(platform.as_str()),
            None => false,
        }
    }
}

pub struct RubygemsClient {
    http: Arc<HttpClient>,
    base_url: String,
    versions: RunCache<Arc<Vec<GemVersion>>>,
}

impl RubygemsClient {
    pub fn new(http: Arc<HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            base_url: base_url(endpoint),
            versions: RunCache::new(),
        }
    }

    async fn versions(&self, name: &str, url: &str) -> Result<Arc<Vec<GemVersion>>> {
        if let Some(versions) = self.versions.get(name) {
            return Ok(versions);
        }

        debug!(gem = name, %url, "Fetching RubyGems versions");
        let versions: Vec<GemVersion> = self.http.get_json(url).await?;
        let versions = Arc::new(versions);
        self.versions.insert(name, Arc::clone(&versions));
        Ok(versions)
    }
}

#[async_trait]
impl RegistryClient for RubygemsClient {
    fn registry(&self) -> Registry {
        Registry::Rubygems
    }

    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>> {
        let url = format!("{}/api/v1/versions/{}.json", self.base_url, package.name());
        let versions = self.versions(package.name(), &url).await?;

        if versions.is_empty() {
            return Err(Error::Lookup(format!(
                "No version data found for {} at {}",
                package.name(),
                url
            )));
        }

        let context = format!("{} version {} at {}", package.name(), package.version(), url);
        let version = versions
            .iter()
            .find(|v| v.matches(package.version()))
            .ok_or_else(|| Error::Lookup(format!("No data found for {}", context)))?;

        let created_at = version
            .created_at
            .as_deref()
            .ok_or_else(|| Error::Lookup(format!("No created_at found for {}", context)))?;

        parse_timestamp(created_at, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use mockito::Server;

    const NOKOGIRI: &str = r#"[
        {"number": "1.16.0", "platform": "x86_64-linux", "created_at": "2023-12-27T17:10:00.000Z"},
        {"number": "1.16.0", "platform": "ruby", "created_at": "2023-12-27T17:05:00.000Z"},
        {"number": "1.15.5", "platform": "ruby", "created_at": "2023-11-17T16:00:00.000Z"}
    ]"#;

    fn client(server: &Server) -> RubygemsClient {
        let http = HttpClient::new(&HttpSettings::default(), None).unwrap();
        RubygemsClient::new(Arc::new(http), &server.url())
    }

    fn gem(version: &str) -> PackageRecord {
        PackageRecord::new(None, "nokogiri", version, "Gemfile.lock", Registry::Rubygems).unwrap()
    }

    #[test]
    fn test_platform_suffix_matching() {
        let v = GemVersion {
            number: "1.16.0".into(),
            platform: Some("x86_64-linux".into()),
            created_at: None,
        };
        assert!(v.matches("1.16.0"));
        assert!(v.matches("1.16.0-x86_64-linux"));
        assert!(!v.matches("1.16.0-arm64-darwin"));
        assert!(!v.matches("1.16"));
    }

    #[tokio::test]
    async fn test_matches_number_and_platform() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/versions/nokogiri.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(NOKOGIRI)
            .expect(1)
            .create_async()
            .await;

        let rubygems = client(&server);
        let linux = rubygems.publish_time(&gem("1.16.0-x86_64-linux")).await.unwrap();
        assert_eq!(linux.to_rfc3339(), "2023-12-27T17:10:00+00:00");

        let older = rubygems.publish_time(&gem("1.15.5")).await.unwrap();
        assert_eq!(older.to_rfc3339(), "2023-11-17T16:00:00+00:00");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_version_and_empty_list() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/versions/nokogiri.json")
            .with_status(200)
            .with_body(NOKOGIRI)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/versions/ghost.json")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let rubygems = client(&server);
        assert!(matches!(
            rubygems.publish_time(&gem("0.0.1")).await,
            Err(Error::Lookup(_))
        ));

        let ghost = PackageRecord::new(None, "ghost", "1.0.0", "Gemfile.lock", Registry::Rubygems)
            .unwrap();
        assert!(matches!(
            rubygems.publish_time(&ghost).await,
            Err(Error::Lookup(ref m)) if m.contains("No version data")
        ));
    }
}
