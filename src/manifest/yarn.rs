use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use super::ManifestParser;
use crate::error::{Error, Result};
use crate::model::PackageRecord;
use crate::urls::resolve_url;

const V1_HEADER: &str = "# yarn lockfile v1";

static RESOLVED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^resolved ["'](.+)["']$"#).expect("resolved line regex"));

/// Reads classic (v1) yarn lock files.
///
/// Only the `resolved` lines matter: each names the exact tarball or
/// commit that was installed.
pub struct YarnLockParser;

#[async_trait]
impl ManifestParser for YarnLockParser {
    fn name(&self) -> &'static str {
        "yarn"
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["yarn.lock"]
    }

    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        if !contents.contains(V1_HEADER) {
            return Err(Error::parse(manifest_path, "Unsupported yarn.lock format"));
        }

        let mut packages = Vec::new();
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || !line.starts_with("resolved ") {
                continue;
            }

            let caps = RESOLVED_LINE.captures(line).ok_or_else(|| {
                Error::parse(manifest_path, format!("Could not parse resolved line: {}", line))
            })?;
            packages.push(resolve_url(manifest_path, &caps[1])?);
        }

        Ok(packages)
    }
}
