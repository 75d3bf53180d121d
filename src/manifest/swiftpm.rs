use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use super::{invalid_json, ManifestParser};
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};

/// Reads Swift Package Manager `Package.resolved` files.
pub struct SwiftPmParser;

#[derive(Deserialize)]
struct Resolved {
    version: Option<u64>,
    object: Option<LegacyObject>,
    pins: Option<Vec<Pin>>,
}

#[derive(Deserialize)]
struct LegacyObject {
    pins: Option<Vec<LegacyPin>>,
}

/// v1 pin.
#[derive(Deserialize)]
struct LegacyPin {
    package: Option<String>,
    #[serde(rename = "repositoryURL")]
    repository_url: Option<String>,
    state: Option<PinState>,
}

/// v2 and v3 pin.
#[derive(Deserialize)]
struct Pin {
    identity: Option<String>,
    location: Option<String>,
    state: Option<PinState>,
}

#[derive(Deserialize)]
struct PinState {
    revision: Option<String>,
}

fn pin_record(
    manifest_path: &str,
    label: Option<&str>,
    location: Option<&str>,
    state: Option<&PinState>,
) -> Result<PackageRecord> {
    let label = label.unwrap_or("<unnamed>");
    let location = location.ok_or_else(|| {
        Error::parse(manifest_path, format!("No location found for package {}", label))
    })?;
    let unsupported =
        || Error::parse(manifest_path, format!("Unsupported remote source: {}", location));

    let url = Url::parse(location).map_err(|_| unsupported())?;
    if url.scheme() != "https" || url.host_str() != Some("github.com") {
        return Err(unsupported());
    }

    let revision = state
        .and_then(|s| s.revision.as_deref())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            Error::parse(manifest_path, format!("No revision found for {}", location))
        })?;

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(unsupported)?;
    let repo = segments.next().ok_or_else(unsupported)?;

    PackageRecord::new(
        Some(owner),
        repo.strip_suffix(".git").unwrap_or(repo),
        format!("commit:{}", revision),
        manifest_path,
        Registry::GithubRepositories,
    )
}

#[async_trait]
impl ManifestParser for SwiftPmParser {
    fn name(&self) -> &'static str {
        "swiftpm"
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["Package.resolved"]
    }

    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        let resolved: Resolved =
            serde_json::from_str(contents).map_err(|e| invalid_json(manifest_path, e))?;

        match resolved.version {
            Some(1) => {
                let pins = resolved
                    .object
                    .and_then(|o| o.pins)
                    .ok_or_else(|| Error::parse(manifest_path, "No 'object.pins' field found"))?;
                pins.iter()
                    .map(|pin| {
                        pin_record(
                            manifest_path,
                            pin.package.as_deref(),
                            pin.repository_url.as_deref(),
                            pin.state.as_ref(),
                        )
                    })
                    .collect()
            }
            // v3 only changed the top-level fields; pins are v2-shaped
            Some(2) | Some(3) => {
                let pins = resolved
                    .pins
                    .ok_or_else(|| Error::parse(manifest_path, "No 'pins' field found"))?;
                pins.iter()
                    .map(|pin| {
                        pin_record(
                            manifest_path,
                            pin.identity.as_deref(),
                            pin.location.as_deref(),
                            pin.state.as_ref(),
                        )
                    })
                    .collect()
            }
            other => Err(Error::parse(
                manifest_path,
                format!(
                    "Unsupported manifest version: {}",
                    other.map(|v| v.to_string()).unwrap_or_else(|| "missing".to_string())
                ),
            )),
        }
    }
}
