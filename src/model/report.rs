use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{PackageRecord, Registry};

/// Counters shared by every in-flight package check of a run.
///
/// Lookups for different registries run on separate tasks, so the counters
/// are atomics and the breach list sits behind a mutex.
#[derive(Debug, Default)]
pub struct ScanStats {
    scanned_packages: AtomicUsize,
    skipped_packages: AtomicUsize,
    breaching_packages: AtomicUsize,
    included_manifests: AtomicUsize,
    skipped_manifests: AtomicUsize,
    breaches: Mutex<Vec<Breach>>,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_included_manifest(&self) {
        self.included_manifests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_manifest(&self) {
        self.skipped_manifests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allowed(&self) {
        self.skipped_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clean(&self) {
        self.scanned_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_breach(&self, breach: Breach) {
        self.scanned_packages.fetch_add(1, Ordering::Relaxed);
        self.breaching_packages.fetch_add(1, Ordering::Relaxed);
        self.breaches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(breach);
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            scanned_package_count: self.scanned_packages.load(Ordering::Relaxed),
            skipped_package_count: self.skipped_packages.load(Ordering::Relaxed),
            breaching_package_count: self.breaching_packages.load(Ordering::Relaxed),
            included_manifest_count: self.included_manifests.load(Ordering::Relaxed),
            skipped_manifest_count: self.skipped_manifests.load(Ordering::Relaxed),
        }
    }

    /// Snapshots the counters into a report. Breaches are sorted so the
    /// report does not depend on lookup completion order.
    pub fn report(&self, max_release_days_ago: f64) -> ScanReport {
        let summary = self.summary();
        let mut breaches = self
            .breaches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|e| e.into_inner().clone());
        breaches.sort_by(|a, b| {
            (a.manifest_path.as_str(), a.id.as_str(), a.version.as_str()).cmp(&(
                b.manifest_path.as_str(),
                b.id.as_str(),
                b.version.as_str(),
            ))
        });

        ScanReport {
            summary,
            max_release_days_ago,
            breaches,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub scanned_package_count: usize,
    pub skipped_package_count: usize,
    pub breaching_package_count: usize,
    pub included_manifest_count: usize,
    pub skipped_manifest_count: usize,
}

/// A package published inside the quarantine window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breach {
    pub id: String,
    pub version: String,
    pub registry: Registry,
    pub manifest_path: String,
    pub published_at: DateTime<Utc>,
    pub days_ago: i64,
}

impl Breach {
    pub fn new(package: &PackageRecord, published_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: package.id(),
            version: package.version().to_string(),
            registry: package.registry(),
            manifest_path: package.manifest_path().to_string(),
            published_at,
            days_ago: (now - published_at).num_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    #[serde(flatten)]
    pub summary: ScanSummary,
    pub max_release_days_ago: f64,
    pub breaches: Vec<Breach>,
}

impl ScanReport {
    pub fn has_breaches(&self) -> bool {
        self.summary.breaching_package_count > 0
    }
}
