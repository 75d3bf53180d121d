//! Lock-file parsers.
//!
//! This module provides the [`ManifestParser`] trait and one implementation
//! per supported ecosystem. A manifest is dispatched to its parser by exact
//! file name.
//!
//! # Available Parsers
//!
//! | Parser | Files | Registries |
//! |--------|-------|------------|
//! | [`NpmLockParser`] | `package-lock.json` (v1, v2, v3) | npm, githubPackages, githubRepositories |
//! | [`YarnLockParser`] | `yarn.lock` (v1) | npm, githubPackages, githubRepositories |
//! | [`PipParser`] | `Pipfile.lock` (`poetry.lock`, `uv.lock`, `pdm.lock` are recognized but unsupported) | pypi, githubRepositories |
//! | [`BundlerParser`] | `Gemfile.lock`, `Gemfile.canary.lock` | rubygems, githubRepositories |
//! | [`SwiftPmParser`] | `Package.resolved` (v1, v2, v3) | githubRepositories |
//!
//! A parser fails on anything it does not understand. The only entries it
//! skips are those that never came from a registry: local links, workspace
//! members and bundled dependencies.
//!
//! # Example
//!
//! ```
//! use supply_chain_guard::manifest::parser_for;
//!
//! let parser = parser_for("services/api/Gemfile.lock").unwrap();
//! assert_eq!(parser.name(), "bundler");
//! assert!(parser_for("Cargo.lock").is_none());
//! ```

mod bundler;
mod npm;
mod pip;
mod swiftpm;
mod yarn;

pub use bundler::BundlerParser;
pub use npm::NpmLockParser;
pub use pip::PipParser;
pub use swiftpm::SwiftPmParser;
pub use yarn::YarnLockParser;

use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::PackageRecord;

/// Trait for reading the dependencies pinned by one kind of lock file.
#[async_trait]
pub trait ManifestParser: Send + Sync {
    /// Returns the short name of this parser.
    fn name(&self) -> &'static str;

    /// Returns the file names this parser handles.
    fn file_names(&self) -> &'static [&'static str];

    /// Parses the contents of a manifest.
    ///
    /// `manifest_path` is the path relative to the scanned root; it ends up
    /// in every returned record and in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the file has an unknown format or an entry
    /// is missing a required field.
    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>>;

    /// Reads `root/manifest_path` and parses it.
    async fn list_packages(&self, root: &Path, manifest_path: &str) -> Result<Vec<PackageRecord>> {
        let full_path = root.join(manifest_path);
        let contents = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| Error::io(&full_path, e))?;
        self.parse(manifest_path, &contents)
    }
}

/// Returns every available parser.
///
/// # Example
///
/// ```
/// use supply_chain_guard::manifest::all_parsers;
///
/// assert_eq!(all_parsers().len(), 5);
/// ```
pub fn all_parsers() -> Vec<Box<dyn ManifestParser>> {
    vec![
        Box::new(NpmLockParser),
        Box::new(YarnLockParser),
        Box::new(PipParser),
        Box::new(BundlerParser),
        Box::new(SwiftPmParser),
    ]
}

/// Returns the parser for a manifest path, matched on its file name.
pub fn parser_for(manifest_path: &str) -> Option<Box<dyn ManifestParser>> {
    let file_name = file_name(manifest_path);
    all_parsers()
        .into_iter()
        .find(|parser| parser.file_names().contains(&file_name))
}

/// Every recognized manifest file name.
pub fn all_file_names() -> Vec<&'static str> {
    all_parsers()
        .iter()
        .flat_map(|parser| parser.file_names().iter().copied())
        .collect()
}

pub(crate) fn file_name(manifest_path: &str) -> &str {
    manifest_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(manifest_path)
}

pub(crate) fn invalid_json(manifest_path: &str, e: serde_json::Error) -> Error {
    Error::parse(manifest_path, format!("Invalid JSON: {}", e))
}
