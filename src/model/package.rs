use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Registry {
    Npm,
    Pypi,
    Rubygems,
    GithubPackages,
    GithubRepositories,
}

impl Registry {
    pub const ALL: [Registry; 5] = [
        Registry::Npm,
        Registry::Pypi,
        Registry::Rubygems,
        Registry::GithubPackages,
        Registry::GithubRepositories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Registry::Npm => "npm",
            Registry::Pypi => "pypi",
            Registry::Rubygems => "rubygems",
            Registry::GithubPackages => "githubPackages",
            Registry::GithubRepositories => "githubRepositories",
        }
    }
}

impl FromStr for Registry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Registry::ALL
            .into_iter()
            .find(|registry| registry.as_str() == s)
            .ok_or_else(|| Error::InvalidPackage(format!("Unknown registry: {}", s)))
    }
}

impl std::fmt::Display for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dependency as declared by one manifest.
///
/// The version is registry-specific: a plain release version for npm, PyPI
/// and RubyGems, `commit:<sha>` or `tag:<name>` for GitHub repositories, and
/// `<type>:<version>` for GitHub Packages.
///
/// Records only come from [`PackageRecord::new`], so they cannot be
/// deserialized:
///
/// ```compile_fail
/// use supply_chain_guard::PackageRecord;
///
/// let record: PackageRecord = serde_json::from_str(
///     r#"{"name": "", "version": "", "manifestPath": "", "registry": "npm"}"#,
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    scope: Option<String>,
    name: String,
    version: String,
    manifest_path: String,
    registry: Registry,
}

impl PackageRecord {
    pub fn new(
        scope: Option<&str>,
        name: impl Into<String>,
        version: impl Into<String>,
        manifest_path: impl Into<String>,
        registry: Registry,
    ) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        let manifest_path = manifest_path.into();

        if name.is_empty() {
            return Err(Error::InvalidPackage("Package name is required".into()));
        }
        if version.is_empty() {
            return Err(Error::InvalidPackage(format!(
                "Package version is required ({})",
                name
            )));
        }
        if manifest_path.is_empty() {
            return Err(Error::InvalidPackage(format!(
                "Manifest path is required ({})",
                name
            )));
        }

        Ok(Self {
            scope: scope.filter(|s| !s.is_empty()).map(str::to_string),
            name,
            version,
            manifest_path,
            registry,
        })
    }

    /// `scope/name` for scoped packages, `name` otherwise. Only unique
    /// together with the registry and version.
    pub fn id(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    pub fn registry(&self) -> Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_with_and_without_scope() {
        let scoped =
            PackageRecord::new(Some("@types"), "react", "19.1.13", "a/package-lock.json", Registry::Npm)
                .unwrap();
        assert_eq!(scoped.id(), "@types/react");

        let plain = PackageRecord::new(None, "lodash", "4.17.21", "package-lock.json", Registry::Npm)
            .unwrap();
        assert_eq!(plain.id(), "lodash");
        assert_eq!(plain.scope(), None);
    }

    #[test]
    fn test_empty_scope_is_treated_as_none() {
        let pkg = PackageRecord::new(Some(""), "rake", "13.0.6", "Gemfile.lock", Registry::Rubygems)
            .unwrap();
        assert_eq!(pkg.scope(), None);
        assert_eq!(pkg.id(), "rake");
    }

    #[test]
    fn test_required_fields() {
        assert!(PackageRecord::new(None, "", "1.0.0", "package-lock.json", Registry::Npm).is_err());
        assert!(PackageRecord::new(None, "lodash", "", "package-lock.json", Registry::Npm).is_err());
        assert!(PackageRecord::new(None, "lodash", "1.0.0", "", Registry::Npm).is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let pkg = PackageRecord::new(None, "lodash", "4.17.21", "web/package-lock.json", Registry::Npm)
            .unwrap();
        let value = serde_json::to_value(&pkg).unwrap();
        assert_eq!(value["manifestPath"], "web/package-lock.json");
        assert_eq!(value["registry"], "npm");
    }

    #[test]
    fn test_unknown_registry_is_rejected() {
        assert!("cargo".parse::<Registry>().is_err());
        assert!("NPM".parse::<Registry>().is_err());
    }

    #[test]
    fn test_registry_names_round_trip() {
        for registry in Registry::ALL {
            assert_eq!(registry.as_str().parse::<Registry>().unwrap(), registry);
        }
        assert_eq!(
            serde_json::to_string(&Registry::GithubRepositories).unwrap(),
            "\"githubRepositories\""
        );
    }
}
