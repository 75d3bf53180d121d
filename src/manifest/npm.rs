use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{invalid_json, ManifestParser};
use crate::error::{Error, Result};
use crate::model::PackageRecord;
use crate::urls::resolve_url;

pub struct NpmLockParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockFile {
    lockfile_version: Option<serde_json::Value>,
    #[serde(default)]
    dependencies: BTreeMap<String, LegacyEntry>,
    #[serde(default)]
    packages: BTreeMap<String, PackageEntry>,
}

/// v1 entry: keyed by package name, nested under whatever pulled it in.
#[derive(Deserialize)]
struct LegacyEntry {
    resolved: Option<String>,
    #[serde(default)]
    bundled: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, LegacyEntry>,
}

/// v2/v3 entry: keyed by install path (`node_modules/a/node_modules/b`).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageEntry {
    resolved: Option<String>,
    #[serde(default)]
    in_bundle: bool,
    #[serde(default)]
    link: bool,
}

impl NpmLockParser {
    fn collect_legacy(
        manifest_path: &str,
        entries: &BTreeMap<String, LegacyEntry>,
        out: &mut Vec<PackageRecord>,
    ) -> Result<()> {
        for entry in entries.values() {
            // bundled entries and everything below them ship inside a tarball
            if entry.bundled {
                continue;
            }
            if let Some(resolved) = &entry.resolved {
                out.push(resolve_url(manifest_path, resolved)?);
            }
            Self::collect_legacy(manifest_path, &entry.dependencies, out)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestParser for NpmLockParser {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["package-lock.json"]
    }

    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        let lock: LockFile =
            serde_json::from_str(contents).map_err(|e| invalid_json(manifest_path, e))?;

        let mut packages = Vec::new();
        match lock.lockfile_version.as_ref().and_then(|v| v.as_u64()) {
            Some(1) => Self::collect_legacy(manifest_path, &lock.dependencies, &mut packages)?,
            Some(2) | Some(3) => {
                for entry in lock.packages.values() {
                    // the root project and workspace members carry no `resolved`
                    let Some(resolved) = &entry.resolved else {
                        continue;
                    };
                    // links resolve to a local directory
                    if entry.in_bundle || entry.link {
                        continue;
                    }
                    packages.push(resolve_url(manifest_path, resolved)?);
                }
            }
            _ => {
                return Err(Error::parse(
                    manifest_path,
                    format!(
                        "Unsupported lockfileVersion: {}",
                        lock.lockfile_version
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "missing".to_string())
                    ),
                ))
            }
        }

        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Registry;

    const V1: &str = include_str!("../../tests/fixtures/npm/v1/package-lock.json");
    const V2: &str = include_str!("../../tests/fixtures/npm/v2/package-lock.json");
    const V3: &str = include_str!("../../tests/fixtures/npm/v3/package-lock.json");

    fn ids(packages: &[PackageRecord]) -> Vec<String> {
        packages
            .iter()
            .map(|p| format!("{}@{}", p.id(), p.version()))
            .collect()
    }

    #[test]
    fn test_v1_walks_nested_dependencies() {
        let packages = NpmLockParser.parse("package-lock.json", V1).unwrap();
        assert_eq!(
            ids(&packages),
            vec![
                "@babel/code-frame@7.22.13",
                "debug@4.3.4",
                "ms@2.1.2",
                "moneytree/dummy-repo@commit:9d3afac0241812068798324dd88b9ca74f281208",
            ]
        );
        assert!(packages.iter().all(|p| p.manifest_path() == "package-lock.json"));
    }

    #[test]
    fn test_v2_skips_root_links_and_bundled() {
        let packages = NpmLockParser.parse("app/package-lock.json", V2).unwrap();
        assert_eq!(
            ids(&packages),
            vec!["acme/widget@npm:2.1.0", "@types/react@19.1.13", "js-tokens@4.0.0"]
        );
        assert_eq!(packages[0].registry(), Registry::GithubPackages);
        assert_eq!(packages[0].scope(), Some("acme"));
    }

    #[test]
    fn test_v3() {
        let packages = NpmLockParser.parse("package-lock.json", V3).unwrap();
        assert_eq!(ids(&packages), vec!["left-pad@1.3.0", "lodash@4.17.21"]);
        assert!(packages.iter().all(|p| p.registry() == Registry::Npm));
    }

    #[test]
    fn test_unsupported_version() {
        let err = NpmLockParser
            .parse("package-lock.json", r#"{"lockfileVersion": 4, "packages": {}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { ref message, .. } if message.contains("lockfileVersion: 4")));

        assert!(NpmLockParser.parse("package-lock.json", "{}").is_err());
        assert!(NpmLockParser.parse("package-lock.json", "not json").is_err());
    }

    #[test]
    fn test_unrecognized_url_is_fatal() {
        let lock = r#"{
            "lockfileVersion": 3,
            "packages": {
                "node_modules/private": {
                    "version": "1.0.0",
                    "resolved": "https://npm.internal.example.com/private/-/private-1.0.0.tgz"
                }
            }
        }"#;
        assert!(matches!(
            NpmLockParser.parse("package-lock.json", lock),
            Err(Error::Parse { .. })
        ));
    }
}
