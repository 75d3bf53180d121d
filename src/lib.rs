//! Flag dependencies that were published too recently to be trusted.
//!
//! A scan walks a source tree, parses every lock file it recognizes and asks
//! each package's registry when the locked version was published. Versions
//! younger than the quarantine window are reported as breaches, unless an
//! allow file exempts them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use supply_chain_guard::{find_breaches, Config, RegistrySet, WorkingTree};
//!
//! # async fn scan() -> supply_chain_guard::Result<()> {
//! let config = Config::default();
//! let registries = RegistrySet::new(&config)?;
//! let report = find_breaches(&config, Arc::new(WorkingTree::new(".")), &registries).await?;
//! println!("{} breaches", report.summary.breaching_package_count);
//! # Ok(())
//! # }
//! ```

pub mod allow;
pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod output;
pub mod registry;
pub mod runner;
pub mod scan;
pub mod urls;
pub mod vcs;

pub use allow::AllowList;
pub use config::Config;
pub use error::{Error, Result};
pub use model::{Breach, PackageRecord, Registry, ScanReport, ScanSummary};
pub use registry::{RegistryClient, RegistrySet};
pub use scan::{find_breaches, Scan};
pub use vcs::{GitRepository, VersionControl, WorkingTree};
