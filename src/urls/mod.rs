//! Download-URL resolution.
//!
//! Lock files for npm and Yarn (and git entries in Pipfile.lock) identify a
//! dependency by the URL it was downloaded from. This module maps such a URL
//! to a [`PackageRecord`] by trying a fixed table of host matchers in order.
//!
//! | Resolver | Hosts | Registry |
//! |----------|-------|----------|
//! | [`UrlResolver::NpmRegistry`] | `registry.npmjs.org` | npm |
//! | [`UrlResolver::GithubPackages`] | `*.pkg.github.com` | githubPackages |
//! | [`UrlResolver::Github`] | `github.com`, `codeload.github.com` | githubRepositories |
//! | [`UrlResolver::YarnRegistry`] | `registry.yarnpkg.com` | npm |
//!
//! The first resolver whose host matches owns the URL: if its path does not
//! have the expected shape the URL is rejected rather than handed on.
//!
//! # Example
//!
//! ```
//! use supply_chain_guard::urls::resolve_url;
//!
//! let pkg = resolve_url("yarn.lock", "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz")?;
//! assert_eq!(pkg.name(), "lodash");
//! assert_eq!(pkg.version(), "4.17.21");
//! # Ok::<(), supply_chain_guard::Error>(())
//! ```

mod github;
mod github_packages;
mod npm;

use crate::error::{Error, Result};
use crate::model::PackageRecord;
use reqwest::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlResolver {
    NpmRegistry,
    GithubPackages,
    Github,
    YarnRegistry,
}

/// Resolvers in the order they are tried.
pub const RESOLVERS: [UrlResolver; 4] = [
    UrlResolver::NpmRegistry,
    UrlResolver::GithubPackages,
    UrlResolver::Github,
    UrlResolver::YarnRegistry,
];

impl UrlResolver {
    pub fn name(&self) -> &'static str {
        match self {
            UrlResolver::NpmRegistry => "registry.npmjs.org",
            UrlResolver::GithubPackages => "pkg.github.com",
            UrlResolver::Github => "github.com",
            UrlResolver::YarnRegistry => "registry.yarnpkg.com",
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            UrlResolver::NpmRegistry => npm::matches_npmjs(url),
            UrlResolver::GithubPackages => github_packages::matches(url),
            UrlResolver::Github => github::matches(url),
            UrlResolver::YarnRegistry => npm::matches_yarnpkg(url),
        }
    }

    pub fn resolve(&self, manifest_path: &str, url: &Url) -> Result<PackageRecord> {
        match self {
            UrlResolver::NpmRegistry | UrlResolver::YarnRegistry => {
                npm::resolve(manifest_path, url)
            }
            UrlResolver::GithubPackages => github_packages::resolve(manifest_path, url),
            UrlResolver::Github => github::resolve(manifest_path, url),
        }
    }
}

/// Resolves an already parsed URL with the first matching resolver.
pub fn resolve(manifest_path: &str, url: &Url) -> Result<PackageRecord> {
    match RESOLVERS.iter().find(|resolver| resolver.matches(url)) {
        Some(resolver) => resolver.resolve(manifest_path, url),
        None => Err(Error::parse(
            manifest_path,
            format!("Could not create package from URL: {}", url),
        )),
    }
}

/// Parses `raw` and resolves it. Unparseable URLs are parse errors of the
/// manifest they came from.
pub fn resolve_url(manifest_path: &str, raw: &str) -> Result<PackageRecord> {
    let url = Url::parse(raw)
        .map_err(|e| Error::parse(manifest_path, format!("Invalid URL {}: {}", raw, e)))?;
    resolve(manifest_path, &url)
}

fn unrecognized(manifest_path: &str, resolver: UrlResolver, url: &Url) -> Error {
    Error::parse(
        manifest_path,
        format!("Unrecognized {} URL: {}", resolver.name(), url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Registry;

    fn check(url: &str, scope: Option<&str>, name: &str, version: &str, registry: Registry) {
        let pkg = resolve_url("my-manifest-path.txt", url)
            .unwrap_or_else(|e| panic!("expected {} to resolve: {}", url, e));
        assert_eq!(pkg.scope(), scope, "scope for {}", url);
        assert_eq!(pkg.name(), name, "name for {}", url);
        assert_eq!(pkg.version(), version, "version for {}", url);
        assert_eq!(pkg.registry(), registry, "registry for {}", url);
        assert_eq!(pkg.manifest_path(), "my-manifest-path.txt");
    }

    #[test]
    fn test_npm_tarballs() {
        check(
            "https://registry.npmjs.org/@types/react/-/react-19.1.13.tgz",
            Some("@types"),
            "react",
            "19.1.13",
            Registry::Npm,
        );
        check(
            "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz",
            None,
            "lodash",
            "4.17.21",
            Registry::Npm,
        );
        check(
            "https://registry.npmjs.org/@babel/core/-/core-7.22.0-beta.1.tgz",
            Some("@babel"),
            "core",
            "7.22.0-beta.1",
            Registry::Npm,
        );
    }

    #[test]
    fn test_yarn_registry_alias() {
        for url in [
            "https://registry.yarnpkg.com/@vue/compiler-core/-/compiler-core-3.3.0-beta.1.tgz#somehash",
            "https://registry.yarnpkg.com/@vue/compiler-core/-/compiler-core-3.3.0-beta.1.tgz",
        ] {
            check(url, Some("@vue"), "compiler-core", "3.3.0-beta.1", Registry::Npm);
        }
        for url in [
            "https://registry.yarnpkg.com/lodash/-/lodash-4.17.21.tgz",
            "https://registry.yarnpkg.com/lodash/-/lodash-4.17.21.tgz#somehash",
        ] {
            check(url, None, "lodash", "4.17.21", Registry::Npm);
        }
    }

    #[test]
    fn test_github_packages_download() {
        check(
            "https://npm.pkg.github.com/download/@moneytree/eslint-config/1.5.0/1d4714834bc552f10a88d214f607c51765ae8b68",
            Some("moneytree"),
            "eslint-config",
            "npm:1.5.0",
            Registry::GithubPackages,
        );
    }

    #[test]
    fn test_github_repositories() {
        for url in [
            "https://github.com/apple/swift-algorithms#f6919dfc309e7f1b56224378b11e28bab5bccc42",
            "https://github.com/apple/swift-algorithms.git#f6919dfc309e7f1b56224378b11e28bab5bccc42",
            "git+ssh://github.com/apple/swift-algorithms.git#f6919dfc309e7f1b56224378b11e28bab5bccc42",
            "git+ssh://git@github.com/apple/swift-algorithms.git#f6919dfc309e7f1b56224378b11e28bab5bccc42",
            "https://codeload.github.com/apple/swift-algorithms/tar.gz/f6919dfc309e7f1b56224378b11e28bab5bccc42",
        ] {
            check(
                url,
                Some("apple"),
                "swift-algorithms",
                "commit:f6919dfc309e7f1b56224378b11e28bab5bccc42",
                Registry::GithubRepositories,
            );
        }
    }

    #[test]
    fn test_unknown_host_is_rejected() {
        let err = resolve_url("yarn.lock", "https://example.com/foo/-/foo-1.0.0.tgz").unwrap_err();
        assert!(err.to_string().contains("Could not create package from URL"));
    }

    #[test]
    fn test_matching_host_with_bad_path_is_rejected() {
        assert!(resolve_url("yarn.lock", "https://registry.npmjs.org/lodash").is_err());
        assert!(resolve_url("yarn.lock", "https://registry.npmjs.org/lodash/-/underscore-1.0.0.tgz").is_err());
        assert!(resolve_url("yarn.lock", "https://github.com/apple/swift-algorithms").is_err());
        assert!(resolve_url("yarn.lock", "https://codeload.github.com/apple/swift-algorithms/zip/abc").is_err());
        assert!(resolve_url("yarn.lock", "https://npm.pkg.github.com/eslint-config/1.5.0").is_err());
    }

    #[test]
    fn test_plain_http_npm_is_not_matched() {
        let url = Url::parse("http://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz").unwrap();
        assert!(!UrlResolver::NpmRegistry.matches(&url));
    }
}
