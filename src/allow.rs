//! Explicitly allowed packages.
//!
//! A release inside the quarantine window can be vetted by hand and then
//! listed in an allow file, `.supply-chain-guard-allow.json`, placed in any
//! directory of the tree. A file applies to every manifest in its directory
//! and below.
//!
//! # Allow File Format
//!
//! ```json
//! {
//!   "npm": {
//!     "left-pad": ["1.3.0"],
//!     "@types/react": "*",
//!     "@acme/*": "*"
//!   },
//!   "githubRepositories": {
//!     "moneytree/rubocop-config": ["commit:c6bdd8755b03d47860e98070e9f9f72bf57f01b2"]
//!   },
//!   "githubPackages": "*"
//! }
//! ```
//!
//! A registry maps to `"*"` (everything from it is allowed) or to package
//! rules. A package rule is keyed by the bare name, `scope/name`, `scope/*`
//! or `*`, and maps to `"*"` or a non-empty list of versions.
//!
//! # Matching
//!
//! Directories are checked from the manifest's own directory up to the
//! root. Within one directory, the first existing key of
//!
//! 1. the bare name (unscoped packages only)
//! 2. `scope/name` (scoped packages only)
//! 3. `scope/*` (scoped packages only)
//! 4. `*`
//!
//! decides. If its versions do not cover the package, the search continues
//! in the parent directory. There are no deny rules.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};
use crate::vcs::VersionControl;

/// File name of allow files.
pub const ALLOW_FILE_NAME: &str = ".supply-chain-guard-allow.json";

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRule {
    Any,
    Only(HashSet<String>),
}

impl VersionRule {
    fn covers(&self, version: &str) -> bool {
        match self {
            VersionRule::Any => true,
            VersionRule::Only(versions) => versions.contains(version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRule {
    Any,
    Packages(HashMap<String, VersionRule>),
}

type DirectoryRules = HashMap<Registry, RegistryRule>;

/// Allow rules of a whole tree, keyed by directory (`.` for the root).
#[derive(Debug, Default)]
pub struct AllowList {
    by_dir: HashMap<String, DirectoryRules>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds, validates and indexes every allow file in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for the first malformed allow file.
    pub async fn load(vcs: &dyn VersionControl) -> Result<Self> {
        let mut list = Self::new();

        for allow_file in vcs.list_files(&[ALLOW_FILE_NAME]).await? {
            let path = vcs.root().join(&allow_file);
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            list.insert(&allow_file, &content)?;
        }

        debug!(files = list.by_dir.len(), "Loaded allow files");
        Ok(list)
    }

    /// Validates the content of one allow file and indexes it under the
    /// file's directory.
    pub fn insert(&mut self, allow_file: &str, content: &str) -> Result<()> {
        let invalid = |message: String| Error::Config(format!("{} in {}", message, allow_file));

        let document: Value = serde_json::from_str(content)
            .map_err(|e| invalid(format!("Invalid JSON ({})", e)))?;
        let Value::Object(registries) = document else {
            return Err(invalid("Expected an object of registries".to_string()));
        };

        let mut rules = DirectoryRules::new();
        let mut has_wildcards = false;

        for (registry_name, packages) in &registries {
            let registry: Registry = registry_name
                .parse()
                .map_err(|_| invalid(format!("Unknown registry {}", registry_name)))?;

            let rule = match packages {
                Value::String(s) if s == WILDCARD => {
                    has_wildcards = true;
                    RegistryRule::Any
                }
                Value::Object(packages) => {
                    let mut package_rules = HashMap::new();
                    for (package_name, versions) in packages {
                        if package_name.trim().is_empty() {
                            return Err(invalid(format!(
                                "Invalid package name for registry {}",
                                registry_name
                            )));
                        }
                        if package_name.contains(WILDCARD) {
                            has_wildcards = true;
                        }

                        let versions = match versions {
                            Value::String(s) if s == WILDCARD => {
                                has_wildcards = true;
                                VersionRule::Any
                            }
                            Value::Array(items) if !items.is_empty() => {
                                let mut set = HashSet::new();
                                for item in items {
                                    match item.as_str().filter(|v| !v.trim().is_empty()) {
                                        Some(version) => set.insert(version.to_string()),
                                        None => {
                                            return Err(invalid(format!(
                                                "Invalid version for package {} in registry {}",
                                                package_name, registry_name
                                            )))
                                        }
                                    };
                                }
                                VersionRule::Only(set)
                            }
                            _ => {
                                return Err(invalid(format!(
                                    "Invalid versions array for package {} in registry {}",
                                    package_name, registry_name
                                )))
                            }
                        };
                        package_rules.insert(package_name.clone(), versions);
                    }
                    RegistryRule::Packages(package_rules)
                }
                _ => {
                    return Err(invalid(format!(
                        "Invalid packages object for registry {}",
                        registry_name
                    )))
                }
            };
            rules.insert(registry, rule);
        }

        if has_wildcards {
            info!(
                "Found {} explicitly allowed package(s) in {} (contains wildcards)",
                rules.len(),
                allow_file
            );
        } else {
            info!(
                "Found {} explicitly allowed package(s) in {}",
                rules.len(),
                allow_file
            );
        }

        self.by_dir.insert(parent_dir(allow_file), rules);
        Ok(())
    }

    /// True if an allow file in the manifest's directory or above covers
    /// this exact package version.
    pub fn is_allowed(&self, package: &PackageRecord) -> bool {
        let mut dirs: Vec<&str> = package.manifest_path().split('/').collect();
        dirs.pop();

        for depth in (0..=dirs.len()).rev() {
            let dir = match dirs[..depth].join("/") {
                joined if joined.is_empty() => ".".to_string(),
                joined => joined,
            };

            let Some(rule) = self
                .by_dir
                .get(&dir)
                .and_then(|rules| rules.get(&package.registry()))
            else {
                continue;
            };

            let packages = match rule {
                RegistryRule::Any => return true,
                RegistryRule::Packages(packages) => packages,
            };

            if let Some(versions) = matching_rule(packages, package) {
                if versions.covers(package.version()) {
                    return true;
                }
            }
        }

        false
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }
}

/// First existing key wins, even if its versions do not match.
fn matching_rule<'a>(
    packages: &'a HashMap<String, VersionRule>,
    package: &PackageRecord,
) -> Option<&'a VersionRule> {
    let keyed = match package.scope() {
        None => packages.get(package.name()),
        Some(scope) => packages
            .get(&format!("{}/{}", scope, package.name()))
            .or_else(|| packages.get(&format!("{}/{}", scope, WILDCARD))),
    };
    keyed.or_else(|| packages.get(WILDCARD))
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npm(scope: Option<&str>, name: &str, version: &str, manifest: &str) -> PackageRecord {
        PackageRecord::new(scope, name, version, manifest, Registry::Npm).unwrap()
    }

    fn list(files: &[(&str, &str)]) -> AllowList {
        let mut list = AllowList::new();
        for (path, content) in files {
            list.insert(path, content).unwrap();
        }
        list
    }

    #[test]
    fn test_unscoped_record_ignores_scoped_rule() {
        let allow = list(&[(ALLOW_FILE_NAME, r#"{"npm": {"@types/react": "*"}}"#)]);
        assert!(!allow.is_allowed(&npm(None, "react", "19.1.13", "package-lock.json")));
        assert!(allow.is_allowed(&npm(Some("@types"), "react", "19.1.13", "package-lock.json")));
    }

    #[test]
    fn test_scoped_record_ignores_unscoped_rule() {
        let allow = list(&[(ALLOW_FILE_NAME, r#"{"npm": {"react": "*"}}"#)]);
        assert!(!allow.is_allowed(&npm(Some("@types"), "react", "19.1.13", "package-lock.json")));
        assert!(allow.is_allowed(&npm(None, "react", "19.1.13", "package-lock.json")));
    }

    #[test]
    fn test_ancestor_directories_apply_siblings_do_not() {
        let allow = list(&[
            (
                "apps/.supply-chain-guard-allow.json",
                r#"{"npm": {"left-pad": ["1.3.0"]}}"#,
            ),
            (
                "libs/.supply-chain-guard-allow.json",
                r#"{"npm": {"lodash": "*"}}"#,
            ),
        ]);

        assert!(allow.is_allowed(&npm(None, "left-pad", "1.3.0", "apps/web/package-lock.json")));
        assert!(allow.is_allowed(&npm(None, "left-pad", "1.3.0", "apps/package-lock.json")));
        assert!(!allow.is_allowed(&npm(None, "left-pad", "1.3.0", "package-lock.json")));
        assert!(!allow.is_allowed(&npm(None, "left-pad", "1.2.0", "apps/web/package-lock.json")));
        assert!(!allow.is_allowed(&npm(None, "lodash", "4.17.21", "apps/web/package-lock.json")));
    }

    #[test]
    fn test_root_file_covers_everything_below() {
        let allow = list(&[(ALLOW_FILE_NAME, r#"{"npm": {"left-pad": "*"}}"#)]);
        assert!(allow.is_allowed(&npm(None, "left-pad", "1.3.0", "a/b/c/package-lock.json")));
    }

    #[test]
    fn test_registry_wildcard_and_registry_mismatch() {
        let allow = list(&[(ALLOW_FILE_NAME, r#"{"githubPackages": "*"}"#)]);
        let pkg = PackageRecord::new(
            Some("acme"),
            "widget",
            "npm:1.0.0",
            "package-lock.json",
            Registry::GithubPackages,
        )
        .unwrap();
        assert!(allow.is_allowed(&pkg));
        assert!(!allow.is_allowed(&npm(Some("acme"), "widget", "1.0.0", "package-lock.json")));
    }

    #[test]
    fn test_first_existing_key_decides_within_a_directory() {
        // the exact entry exists, so the scope wildcard is never consulted
        let allow = list(&[(
            ALLOW_FILE_NAME,
            r#"{"npm": {"@acme/widget": ["1.0.0"], "@acme/*": "*", "*": "*"}}"#,
        )]);
        assert!(allow.is_allowed(&npm(Some("@acme"), "widget", "1.0.0", "package-lock.json")));
        assert!(!allow.is_allowed(&npm(Some("@acme"), "widget", "2.0.0", "package-lock.json")));
        assert!(allow.is_allowed(&npm(Some("@acme"), "gadget", "2.0.0", "package-lock.json")));
        assert!(allow.is_allowed(&npm(None, "anything", "0.0.1", "package-lock.json")));
    }

    #[test]
    fn test_non_matching_version_falls_through_to_parent() {
        let allow = list(&[
            (
                "web/.supply-chain-guard-allow.json",
                r#"{"npm": {"left-pad": ["1.2.0"]}}"#,
            ),
            (ALLOW_FILE_NAME, r#"{"npm": {"left-pad": ["1.3.0"]}}"#),
        ]);
        assert!(allow.is_allowed(&npm(None, "left-pad", "1.3.0", "web/package-lock.json")));
    }

    #[test]
    fn test_unmentioned_package_is_not_allowed() {
        let allow = AllowList::new();
        assert!(allow.is_empty());
        assert!(!allow.is_allowed(&npm(None, "left-pad", "1.3.0", "package-lock.json")));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            (r#"{"cargo": "*"}"#, "Unknown registry"),
            (r#"{"npm": ["left-pad"]}"#, "Invalid packages object"),
            (r#"{"npm": "all"}"#, "Invalid packages object"),
            (r#"{"npm": {" ": "*"}}"#, "Invalid package name"),
            (r#"{"npm": {"left-pad": []}}"#, "Invalid versions array"),
            (r#"{"npm": {"left-pad": "1.3.0"}}"#, "Invalid versions array"),
            (r#"{"npm": {"left-pad": ["1.3.0", ""]}}"#, "Invalid version"),
            (r#"{"npm": {"left-pad": [1]}}"#, "Invalid version"),
            (r#"["npm"]"#, "Expected an object"),
            ("{", "Invalid JSON"),
        ];

        for (content, expected) in cases {
            let err = AllowList::new().insert(ALLOW_FILE_NAME, content).unwrap_err();
            assert!(err.is_usage_error(), "{}", content);
            assert!(
                err.to_string().contains(expected),
                "{} should fail with {}, got {}",
                content,
                expected,
                err
            );
        }
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(ALLOW_FILE_NAME), ".");
        assert_eq!(parent_dir("a/b/.supply-chain-guard-allow.json"), "a/b");
    }
}
