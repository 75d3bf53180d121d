use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use super::{unrecognized, UrlResolver};
use crate::error::Result;
use crate::model::{PackageRecord, Registry};

// /@scope/name/-/name-1.2.3.tgz or /name/-/name-1.2.3.tgz
static TARBALL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:(@[\w-]+)/)?([^/]+)/-/([^/]+)\.tgz$").expect("tarball path regex")
});

pub(super) fn matches_npmjs(url: &Url) -> bool {
    url.scheme() == "https" && url.host_str() == Some("registry.npmjs.org")
}

pub(super) fn matches_yarnpkg(url: &Url) -> bool {
    url.scheme() == "https" && url.host_str() == Some("registry.yarnpkg.com")
}

/// Both hosts serve the same tarball layout. The yarn CDN appends an
/// integrity hash as the fragment, which the path match never sees.
pub(super) fn resolve(manifest_path: &str, url: &Url) -> Result<PackageRecord> {
    let resolver = if matches_yarnpkg(url) {
        UrlResolver::YarnRegistry
    } else {
        UrlResolver::NpmRegistry
    };

    let caps = TARBALL_PATH
        .captures(url.path())
        .ok_or_else(|| unrecognized(manifest_path, resolver, url))?;

    let scope = caps.get(1).map(|m| m.as_str());
    let name = &caps[2];
    let file_stem = &caps[3];

    let version = file_stem
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|version| !version.is_empty())
        .ok_or_else(|| unrecognized(manifest_path, resolver, url))?;

    PackageRecord::new(scope, name, version, manifest_path, Registry::Npm)
}
