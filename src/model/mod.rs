//! Core data types for packages and scan results.
//!
//! This module contains the fundamental types used throughout supply-chain-guard:
//!
//! - [`Registry`] - Where a package is hosted (npm, PyPI, GitHub, ...)
//! - [`PackageRecord`] - One dependency discovered in a manifest
//! - [`ScanStats`] - Counters accumulated while a scan runs
//! - [`Breach`] - A package published inside the quarantine window
//! - [`ScanReport`] - Complete scan results
//!
//! # Example
//!
//! ```
//! use supply_chain_guard::{PackageRecord, Registry};
//!
//! let package = PackageRecord::new(Some("@types"), "react", "19.1.13", "package-lock.json", Registry::Npm)?;
//! assert_eq!(package.id(), "@types/react");
//! # Ok::<(), supply_chain_guard::Error>(())
//! ```

mod package;
mod report;

pub use package::*;
pub use report::*;
