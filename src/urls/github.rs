use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use super::{unrecognized, UrlResolver};
use crate::error::Result;
use crate::model::{PackageRecord, Registry};

// github.com/owner/repo(.git)#<commit>
static REPO_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([^/]+)/([^/]+?)(?:\.git)?$").expect("repo path regex"));

// codeload.github.com/owner/repo/tar.gz/<commit>
static CODELOAD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([^/]+)/([^/]+)/tar\.gz/(.+)$").expect("codeload path regex")
});

pub(super) fn matches(url: &Url) -> bool {
    matches!(url.host_str(), Some("github.com") | Some("codeload.github.com"))
}

pub(super) fn resolve(manifest_path: &str, url: &Url) -> Result<PackageRecord> {
    let (owner, repo, commit) = if url.host_str() == Some("codeload.github.com") {
        let caps = CODELOAD_PATH
            .captures(url.path())
            .ok_or_else(|| unrecognized(manifest_path, UrlResolver::Github, url))?;
        (caps[1].to_string(), caps[2].to_string(), caps[3].to_string())
    } else {
        let commit = url
            .fragment()
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| unrecognized(manifest_path, UrlResolver::Github, url))?;
        let caps = REPO_PATH
            .captures(url.path())
            .ok_or_else(|| unrecognized(manifest_path, UrlResolver::Github, url))?;
        (caps[1].to_string(), caps[2].to_string(), commit.to_string())
    };

    PackageRecord::new(
        Some(&owner),
        repo,
        format!("commit:{}", commit),
        manifest_path,
        Registry::GithubRepositories,
    )
}
