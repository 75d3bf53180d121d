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
struct Tag {
    name: String,
    commit: Option<TagCommit>,
}

#[derive(Deserialize)]
struct TagCommit {
    sha: Option<String>,
}

#[derive(Deserialize)]
struct CommitResponse {
    commit: Option<CommitDetails>,
}

#[derive(Deserialize)]
struct CommitDetails {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    date: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Revision<'a> {
    Tag(&'a str),
    Commit(&'a str),
}

impl<'a> Revision<'a> {
    fn parse(version: &'a str) -> Result<Self> {
        match version.split_once(':') {
            Some(("tag", tag)) if !tag.is_empty() => Ok(Revision::Tag(tag)),
            Some(("commit", sha)) if !sha.is_empty() => Ok(Revision::Commit(sha)),
            _ => Err(Error::InvalidPackage(format!(
                "Unsupported version format: {}",
                version
            ))),
        }
    }
}

/// Dates dependencies pinned to a GitHub repository by the commit they use.
///
/// The public API works without a token, at a much lower rate limit.
pub struct GithubRepositoriesClient {
    http: Arc<HttpClient>,
    api_url: String,
    commits: RunCache<DateTime<Utc>>,
}

impl GithubRepositoriesClient {
    pub fn new(http: Arc<HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            api_url: base_url(endpoint),
            commits: RunCache::new(),
        }
    }

    async fn resolve_tag(&self, repo_url: &str, tag: &str) -> Result<String> {
        let url = format!("{}/tags", repo_url);
        debug!(%url, tag, "Resolving tag");
        let tags: Vec<Tag> = self.http.github_paginated(&url, false).await?;

        let found = tags.iter().find(|t| t.name == tag).ok_or_else(|| {
            Error::Lookup(format!(
                "Tag {} not found in {} (searched {} tags)",
                tag,
                url,
                tags.len()
            ))
        })?;

        found
            .commit
            .as_ref()
            .and_then(|c| c.sha.clone())
            .ok_or_else(|| Error::Lookup(format!("No commit found for tag {} in {}", tag, url)))
    }
}

#[async_trait]
impl RegistryClient for GithubRepositoriesClient {
    fn registry(&self) -> Registry {
        Registry::GithubRepositories
    }

    async fn publish_time(&self, package: &PackageRecord) -> Result<DateTime<Utc>> {
        let owner = package.scope().ok_or_else(|| {
            Error::InvalidPackage(format!(
                "Package scope is required for GitHub Repositories: {} ({})",
                package.id(),
                package.manifest_path()
            ))
        })?;

        let key = format!("{}@{}", package.id(), package.version());
        if let Some(published) = self.commits.get(&key) {
            return Ok(published);
        }

        let repo_url = format!("{}/repos/{}/{}", self.api_url, owner, package.name());
        let sha = match Revision::parse(package.version())? {
            Revision::Commit(sha) => sha.to_string(),
            Revision::Tag(tag) => self.resolve_tag(&repo_url, tag).await?,
        };

        let url = format!("{}/commits/{}", repo_url, sha);
        debug!(package = %package.id(), %url, "Fetching commit");
        let response: CommitResponse = self.http.github_json(&url, false).await?;

        let date = response
            .commit
            .as_ref()
            .and_then(|c| {
                c.author
                    .as_ref()
                    .and_then(|s| s.date.clone())
                    .or_else(|| c.committer.as_ref().and_then(|s| s.date.clone()))
            })
            .ok_or_else(|| Error::Lookup(format!("No commit date found for {}", url)))?;

        let published = parse_timestamp(&date, &url)?;
        self.commits.insert(key, published);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use mockito::{Matcher, Server};

    const SHA: &str = "4f6b2c2a9e1d7b3c5a8f0e2d4c6b8a0f1e3d5c7b";

    fn client(server: &Server) -> GithubRepositoriesClient {
        let http = HttpClient::new(&HttpSettings::default(), None).unwrap();
        GithubRepositoriesClient::new(Arc::new(http), &server.url())
    }

    fn repo(version: &str) -> PackageRecord {
        PackageRecord::new(
            Some("acme"),
            "widget",
            version,
            "Gemfile.lock",
            Registry::GithubRepositories,
        )
        .unwrap()
    }

    #[test]
    fn test_revision_parsing() {
        assert_eq!(Revision::parse("tag:v1.2.0").unwrap(), Revision::Tag("v1.2.0"));
        assert_eq!(Revision::parse("commit:abc").unwrap(), Revision::Commit("abc"));
        assert!(Revision::parse("branch:main").is_err());
        assert!(Revision::parse("abc").is_err());
        assert!(Revision::parse("commit:").is_err());
    }

    #[tokio::test]
    async fn test_commit_author_date() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/repos/acme/widget/commits/{}", SHA).as_str())
            .match_header("accept", "application/vnd.github+json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"sha": "x", "commit": {
                    "author": {"name": "a", "date": "2025-10-10T10:00:00Z"},
                    "committer": {"name": "c", "date": "2025-10-11T10:00:00Z"}
                }}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let github = client(&server);
        let version = format!("commit:{}", SHA);
        let t = github.publish_time(&repo(&version)).await.unwrap();
        assert_eq!(t.to_rfc3339(), "2025-10-10T10:00:00+00:00");

        github.publish_time(&repo(&version)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_committer_date_fallback() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget/commits/abc123")
            .with_status(200)
            .with_body(r#"{"commit": {"committer": {"date": "2025-10-11T10:00:00Z"}}}"#)
            .create_async()
            .await;

        let t = client(&server)
            .publish_time(&repo("commit:abc123"))
            .await
            .unwrap();
        assert_eq!(t.to_rfc3339(), "2025-10-11T10:00:00+00:00");
    }

    #[tokio::test]
    async fn test_tag_resolves_to_commit() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/repos/acme/widget/tags".to_string()))
            .with_status(200)
            .with_body(format!(
                r#"[{{"name": "v2.0.0", "commit": {{"sha": "fff"}}}}, {{"name": "v1.0.0", "commit": {{"sha": "{}"}}}}]"#,
                SHA
            ))
            .create_async()
            .await;
        let commit = server
            .mock("GET", format!("/repos/acme/widget/commits/{}", SHA).as_str())
            .with_status(200)
            .with_body(r#"{"commit": {"author": {"date": "2024-01-02T03:04:05Z"}}}"#)
            .create_async()
            .await;

        let t = client(&server)
            .publish_time(&repo("tag:v1.0.0"))
            .await
            .unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        commit.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_commit_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widget/commits/deadbeef")
            .with_status(422)
            .create_async()
            .await;

        let err = client(&server)
            .publish_time(&repo("commit:deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { status: 422, .. }));
    }
}
