//! Configuration file handling.
//!
//! Options are layered: built-in defaults, then a TOML file, then command
//! line flags. The first file found wins:
//!
//! 1. the path given with `--config`
//! 2. `.supply-chain-guard.toml` in the scanned root
//! 3. the user config file:
//!    - Linux: `~/.config/supply-chain-guard/config.toml`
//!    - macOS: `~/Library/Application Support/supply-chain-guard/config.toml`
//!    - Windows: `%APPDATA%\supply-chain-guard\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! concurrency = 20
//! max_release_days_ago = 10.0
//! diff_against_branch = "main"
//! force = false
//! format = "text"
//!
//! [endpoints]
//! npm = "https://registry.npmjs.org"
//! pypi = "https://pypi.org"
//! rubygems = "https://rubygems.org"
//! github_api = "https://api.github.com"
//!
//! [http]
//! max_attempts = 5
//! retry_delay_ms = 1000
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the per-project config file looked up in the scanned root.
pub const PROJECT_CONFIG_FILE: &str = ".supply-chain-guard.toml";

/// Application configuration.
///
/// # Example
///
/// ```
/// use supply_chain_guard::Config;
///
/// let config = Config::default();
/// assert_eq!(config.concurrency, 20);
/// assert_eq!(config.max_release_days_ago, 10.0);
/// config.validate()?;
/// # Ok::<(), supply_chain_guard::Error>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of concurrent requests per registry.
    ///
    /// Default: 20
    pub concurrency: usize,

    /// Releases younger than this many days are breaches. Fractions allowed.
    ///
    /// Default: 10
    pub max_release_days_ago: f64,

    /// Only scan manifests that differ from this branch.
    ///
    /// Default: none (manifests are selected by last-modified time)
    pub diff_against_branch: Option<String>,

    /// Scan every manifest, regardless of diff or age.
    ///
    /// Default: false
    pub force: bool,

    /// Report format: "text" or "json".
    ///
    /// Default: "text"
    pub format: String,

    /// Registry base URLs.
    pub endpoints: Endpoints,

    /// Retry behaviour for registry requests.
    pub http: HttpSettings,

    /// Bearer token for the GitHub API, read from `GITHUB_TOKEN`.
    #[serde(skip)]
    pub github_token: Option<String>,
}

/// Base URLs of the registries, without a trailing slash.
///
/// Point these at a mirror, or at a local server in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub npm: String,
    pub pypi: String,
    pub rubygems: String,
    pub github_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            npm: "https://registry.npmjs.org".to_string(),
            pypi: "https://pypi.org".to_string(),
            rubygems: "https://rubygems.org".to_string(),
            github_api: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Total attempts for a request answered with 429 or 5xx.
    pub max_attempts: u32,

    /// Wait before retry `n` is `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 20,
            max_release_days_ago: 10.0,
            diff_against_branch: None,
            force: false,
            format: "text".to_string(),
            endpoints: Endpoints::default(),
            http: HttpSettings::default(),
            github_token: None,
        }
    }
}

// Hand-written so the GitHub token never reaches the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("concurrency", &self.concurrency)
            .field("max_release_days_ago", &self.max_release_days_ago)
            .field("diff_against_branch", &self.diff_against_branch)
            .field("force", &self.force)
            .field("format", &self.format)
            .field("endpoints", &self.endpoints)
            .field("http", &self.http)
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Config {
    /// Loads configuration for a scan of `root`.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    /// The GitHub token is taken from the environment in every case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a config file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => {
                let project = root.join(PROJECT_CONFIG_FILE);
                let user = Self::config_path();
                if project.exists() {
                    Self::load_from(&project)?
                } else if user.exists() {
                    Self::load_from(&user)?
                } else {
                    Self::default()
                }
            }
        };

        config.github_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Ok(config)
    }

    /// Reads one TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Checks the value ranges the scan relies on.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(Error::Config(
                "--concurrency must be a positive integer".to_string(),
            ));
        }

        if !self.max_release_days_ago.is_finite() || self.max_release_days_ago <= 0.0 {
            return Err(Error::Config(
                "--max-release-days-ago must be a positive number".to_string(),
            ));
        }

        if let Some(branch) = &self.diff_against_branch {
            if branch.trim().is_empty() {
                return Err(Error::Config("--diff requires a branch name".to_string()));
            }
        }

        if !matches!(self.format.as_str(), "text" | "json") {
            return Err(Error::Config(format!(
                "Unknown format: {}. Use 'text' or 'json'",
                self.format
            )));
        }

        if self.http.max_attempts < 1 {
            return Err(Error::Config(
                "http.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The quarantine window as a duration.
    pub fn quarantine_window(&self) -> Duration {
        Duration::milliseconds((self.max_release_days_ago * 86_400_000.0) as i64)
    }

    /// Returns the path to the user configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use supply_chain_guard::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("supply-chain-guard/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("supply-chain-guard")
            .join("config.toml")
    }
}
