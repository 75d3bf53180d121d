use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use super::{unrecognized, UrlResolver};
use crate::error::Result;
use crate::model::{PackageRecord, Registry};

// /download/@owner/package/1.5.0/<digest>
static DOWNLOAD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/download/@([\w-]+)/([^/]+)/([^/]+)/.+$").expect("download path regex")
});

pub(super) fn matches(url: &Url) -> bool {
    url.scheme() == "https"
        && url
            .host_str()
            .is_some_and(|host| host.ends_with(".pkg.github.com"))
}

/// The subdomain names the package type (npm, maven, rubygems, ...), which
/// the versions API needs, so it travels inside the version string.
pub(super) fn resolve(manifest_path: &str, url: &Url) -> Result<PackageRecord> {
    let caps = DOWNLOAD_PATH
        .captures(url.path())
        .ok_or_else(|| unrecognized(manifest_path, UrlResolver::GithubPackages, url))?;

    let package_type = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .unwrap_or_default();
    let version = format!("{}:{}", package_type, &caps[3]);

    PackageRecord::new(
        Some(&caps[1]),
        &caps[2],
        version,
        manifest_path,
        Registry::GithubPackages,
    )
}
