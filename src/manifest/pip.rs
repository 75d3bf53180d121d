use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{file_name, invalid_json, ManifestParser};
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};
use crate::urls;

const SUPPORTED_PIPFILE_SPEC: u64 = 6;

// "==1.2.3", "~= 2.0", ...
static PINNED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[=<>!~]+\s*([a-zA-Z0-9_.\-]+)\s*$").expect("pinned version regex")
});

/// Reads Python lock files. Only `Pipfile.lock` is understood so far.
pub struct PipParser;

#[derive(Deserialize)]
struct PipfileLock {
    #[serde(rename = "_meta")]
    meta: Meta,
    #[serde(default)]
    default: BTreeMap<String, Requirement>,
    #[serde(default)]
    develop: BTreeMap<String, Requirement>,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(rename = "pipfile-spec")]
    pipfile_spec: Option<u64>,
    #[serde(default)]
    sources: Vec<Source>,
}

#[derive(Deserialize)]
struct Source {
    name: String,
}

#[derive(Deserialize)]
struct Requirement {
    git: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    version: Option<String>,
}

impl PipParser {
    fn parse_pipfile_lock(manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        let lock: PipfileLock =
            serde_json::from_str(contents).map_err(|e| invalid_json(manifest_path, e))?;

        if lock.meta.pipfile_spec != Some(SUPPORTED_PIPFILE_SPEC) {
            return Err(Error::parse(
                manifest_path,
                format!(
                    "Pipfile.lock spec version {} not implemented yet",
                    lock.meta
                        .pipfile_spec
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "missing".to_string())
                ),
            ));
        }

        let registry = match lock.meta.sources.as_slice() {
            [source] if source.name == "pypi" => Registry::Pypi,
            [source] => {
                return Err(Error::parse(
                    manifest_path,
                    format!("Unsupported source: {}", source.name),
                ))
            }
            sources => {
                return Err(Error::parse(
                    manifest_path,
                    format!("Pipfile.lock with {} sources not implemented yet", sources.len()),
                ))
            }
        };

        let mut packages = Vec::new();
        for (name, requirement) in lock.default.iter().chain(lock.develop.iter()) {
            packages.push(Self::requirement(manifest_path, registry, name, requirement)?);
        }
        Ok(packages)
    }

    fn requirement(
        manifest_path: &str,
        registry: Registry,
        name: &str,
        requirement: &Requirement,
    ) -> Result<PackageRecord> {
        // VCS dependencies have no registry release; the commit is dated instead
        if let Some(git) = &requirement.git {
            let mut url = Url::parse(git).map_err(|e| {
                Error::parse(manifest_path, format!("Invalid git URL for {}: {}", name, e))
            })?;
            url.set_fragment(requirement.git_ref.as_deref());
            return urls::resolve(manifest_path, &url);
        }

        let version = requirement.version.as_deref().ok_or_else(|| {
            Error::parse(
                manifest_path,
                format!("No version specified in Pipfile.lock for {}", name),
            )
        })?;
        let caps = PINNED_VERSION.captures(version).ok_or_else(|| {
            Error::parse(
                manifest_path,
                format!("Could not parse version in Pipfile.lock for {}: {}", name, version),
            )
        })?;

        PackageRecord::new(None, name, &caps[1], manifest_path, registry)
    }
}

#[async_trait]
impl ManifestParser for PipParser {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["Pipfile.lock", "poetry.lock", "uv.lock", "pdm.lock"]
    }

    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        match file_name(manifest_path) {
            "Pipfile.lock" => Self::parse_pipfile_lock(manifest_path, contents),
            other => Err(Error::parse(
                manifest_path,
                format!("{} parsing not implemented yet", other),
            )),
        }
    }
}
