//! Error types for supply-chain-guard.
//!
//! Every failure is fatal for the run. The variants separate the classes a
//! user needs to tell apart: bad configuration, an unreadable manifest, a
//! registry that could not be reached, and a registry that answered but does
//! not know the requested version.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for supply-chain-guard operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid options, config file or allow file.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A manifest could not be understood.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// A package record violated its invariants.
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// The registry answered with a non-success status.
    #[error("HTTP error from {url}: status {status}{}", retries_suffix(.attempts))]
    Http {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// The request never produced a response.
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered, but the package data is missing or malformed.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// IO errors with the offending path.
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The version-control query failed.
    #[error("Version control error: {0}")]
    Vcs(String),

    /// Any failure while checking one package, with the package attached.
    #[error("Error checking publish time for {id} version {version} ({manifest}): {source}")]
    Package {
        id: String,
        version: String,
        manifest: String,
        #[source]
        source: Box<Error>,
    },

    /// A background task panicked.
    #[error("Task failed: {0}")]
    Join(String),
}

fn retries_suffix(attempts: &u32) -> String {
    if *attempts > 1 {
        format!(" ({} attempts exhausted)", attempts)
    } else {
        String::new()
    }
}

impl Error {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the run failed because of how it was invoked rather than
    /// because of what it found.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_mentions_exhausted_attempts() {
        let err = Error::Http {
            url: "https://registry.npmjs.org/lodash".to_string(),
            status: 503,
            attempts: 5,
        };
        let message = err.to_string();
        assert!(message.contains("status 503"));
        assert!(message.contains("5 attempts exhausted"));

        let err = Error::Http {
            url: "https://registry.npmjs.org/lodash".to_string(),
            status: 404,
            attempts: 1,
        };
        assert!(!err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_package_error_carries_context() {
        let err = Error::Package {
            id: "@types/react".to_string(),
            version: "19.1.13".to_string(),
            manifest: "web/package-lock.json".to_string(),
            source: Box::new(Error::Lookup("no publish time".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("@types/react"));
        assert!(message.contains("19.1.13"));
        assert!(message.contains("web/package-lock.json"));
    }

    #[test]
    fn test_usage_error_classification() {
        assert!(Error::Config("bad".into()).is_usage_error());
        assert!(!Error::Lookup("missing".into()).is_usage_error());
    }
}
