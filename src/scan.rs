//! The breach scan.
//!
//! [`find_breaches`] runs the whole pipeline:
//!
//! 1. load the allow files
//! 2. list every manifest in the tree
//! 3. decide per manifest whether to scan it (changed against the diff
//!    branch, or modified inside the quarantine window, or `force`)
//! 4. parse the included manifests and group their packages by registry
//! 5. look up publish times, at most `concurrency` requests per registry
//! 6. count allowed, clean and breaching packages
//!
//! Registries are processed at the same time, each through its own bounded
//! runner. The first failing lookup aborts the run: the error is returned
//! once every registry group has settled.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use crate::allow::AllowList;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::{all_file_names, parser_for};
use crate::model::{Breach, PackageRecord, Registry, ScanReport, ScanStats};
use crate::registry::{RegistryClient, RegistrySet};
use crate::runner::run_bounded;
use crate::vcs::VersionControl;

/// One scan run. Everything it accumulates is dropped with it.
pub struct Scan<'a> {
    config: &'a Config,
    vcs: Arc<dyn VersionControl>,
    registries: &'a RegistrySet,
    now: DateTime<Utc>,
    stats: Arc<ScanStats>,
}

/// Scans the tree behind `vcs` with the current time as reference.
pub async fn find_breaches(
    config: &Config,
    vcs: Arc<dyn VersionControl>,
    registries: &RegistrySet,
) -> Result<ScanReport> {
    Scan::new(config, vcs, registries).run().await
}

impl<'a> Scan<'a> {
    pub fn new(config: &'a Config, vcs: Arc<dyn VersionControl>, registries: &'a RegistrySet) -> Self {
        Self {
            config,
            vcs,
            registries,
            now: Utc::now(),
            stats: Arc::new(ScanStats::new()),
        }
    }

    /// Fixes the reference time, for reproducible runs.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.now - self.config.quarantine_window()
    }

    pub async fn run(self) -> Result<ScanReport> {
        self.config.validate()?;
        debug!(config = ?self.config, "Scan options");

        let allow = Arc::new(AllowList::load(self.vcs.as_ref()).await?);
        let groups = self.packages_by_registry().await?;

        let this = &self;
        let checks = groups.into_iter().map(|(registry, packages)| {
            let allow = Arc::clone(&allow);
            async move { this.check_registry(registry, packages, allow).await }
        });

        // groups are independent: let every one settle, then report the first failure
        for outcome in join_all(checks).await {
            outcome?;
        }

        Ok(self.stats.report(self.config.max_release_days_ago))
    }

    async fn packages_by_registry(&self) -> Result<BTreeMap<Registry, Vec<PackageRecord>>> {
        let manifests = self.vcs.list_files(&all_file_names()).await?;

        let diff_files = match &self.config.diff_against_branch {
            Some(branch) => {
                info!("Getting list of files that differ from branch {}", branch);
                let changed = self.vcs.changed_files(branch).await?;
                Some(changed.into_iter().collect::<HashSet<_>>())
            }
            None => None,
        };

        let mut groups: BTreeMap<Registry, Vec<PackageRecord>> = BTreeMap::new();
        for manifest in manifests {
            let parser = parser_for(&manifest).ok_or_else(|| {
                Error::parse(&manifest, "No parser found for manifest file")
            })?;
            info!(parser = parser.name(), "Found manifest file: {}", manifest);

            if !self.should_scan(&manifest, diff_files.as_ref()).await? {
                self.stats.record_skipped_manifest();
                continue;
            }

            let packages = parser.list_packages(self.vcs.root(), &manifest).await?;
            debug!(manifest, count = packages.len(), "Parsed manifest");
            for package in packages {
                groups.entry(package.registry()).or_default().push(package);
            }
            self.stats.record_included_manifest();
        }

        Ok(groups)
    }

    async fn should_scan(&self, manifest: &str, diff_files: Option<&HashSet<String>>) -> Result<bool> {
        if let (Some(diff_files), Some(branch)) = (diff_files, &self.config.diff_against_branch) {
            if diff_files.contains(manifest) {
                return Ok(true);
            }
            if self.config.force {
                debug!(
                    manifest,
                    "Forcing check of manifest file despite it not being in diff against branch {}",
                    branch
                );
                return Ok(true);
            }
            info!(
                manifest,
                "Skipping manifest file as it is not in diff against branch {}", branch
            );
            return Ok(false);
        }

        let modified = self.vcs.last_modified(manifest).await?;
        if modified >= self.cutoff() {
            return Ok(true);
        }

        let days_ago = (self.now - modified).num_days();
        if self.config.force {
            debug!(
                manifest,
                "Forcing check of manifest file despite it being last modified {} days ago", days_ago
            );
            return Ok(true);
        }
        info!(
            manifest,
            "Skipping manifest file as it was last modified {} days ago", days_ago
        );
        Ok(false)
    }

    async fn check_registry(
        &self,
        registry: Registry,
        packages: Vec<PackageRecord>,
        allow: Arc<AllowList>,
    ) -> Result<()> {
        let client = self.registries.client(registry)?;
        info!(%registry, count = packages.len(), "Checking publish times");

        let tasks = packages.into_iter().map(|package| {
            let check = PackageCheck {
                package,
                allow: Arc::clone(&allow),
                client: Arc::clone(&client),
                stats: Arc::clone(&self.stats),
                cutoff: self.cutoff(),
                now: self.now,
            };
            move || check.run()
        });

        run_bounded(self.config.concurrency, tasks).await?;
        Ok(())
    }
}

/// Everything one package lookup needs, owned so it can run on its own task.
struct PackageCheck {
    package: PackageRecord,
    allow: Arc<AllowList>,
    client: Arc<dyn RegistryClient>,
    stats: Arc<ScanStats>,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl PackageCheck {
    async fn run(self) -> Result<()> {
        let package = &self.package;
        let registry = package.registry();
        let manifest = package.manifest_path();

        if self.allow.is_allowed(package) {
            self.stats.record_allowed();
            debug!(
                %registry,
                manifest,
                "Skipping explicitly allowed package: {} version {}",
                package.id(),
                package.version()
            );
            return Ok(());
        }

        let published = match self.client.publish_time(package).await {
            Ok(published) => published,
            Err(e) => {
                error!(
                    %registry,
                    manifest,
                    "Error checking publish time for {} version {}: {}",
                    package.id(),
                    package.version(),
                    e
                );
                return Err(Error::Package {
                    id: package.id(),
                    version: package.version().to_string(),
                    manifest: manifest.to_string(),
                    source: Box::new(e),
                });
            }
        };

        let days_ago = (self.now - published).num_days();
        if published > self.cutoff {
            error!(
                %registry,
                manifest,
                "{} version {} was published {} days ago",
                package.id(),
                package.version(),
                days_ago
            );
            self.stats
                .record_breach(Breach::new(package, published, self.now));
        } else {
            trace!(
                %registry,
                manifest,
                "{} version {} was published {} days ago",
                package.id(),
                package.version(),
                days_ago
            );
            self.stats.record_clean();
        }

        Ok(())
    }
}
