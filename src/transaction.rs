// src/transaction.rs

//! Install, upgrade, and removal
//!
//! Each operation runs in two stages. Everything that has to come over the
//! network is fetched first; only when every archive is in the cache does
//! anything touch the install tree. After the tree has been modified the store
//! is reloaded from disk, whether the operation succeeded or not.

use crate::db::Store;
use crate::error::{Error, Result};
use crate::filesystem::{self, RemovalSummary};
use crate::packages::Package;
use crate::progress::Progress;
use crate::repository::{self, Fetcher};
use crate::resolver::BrokenDependency;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Receives synchronous notifications while an operation runs
///
/// Every method has an empty default, so an observer only implements what it
/// shows.
pub trait Observer {
    fn broken_dependency(&mut self, _broken: &BrokenDependency) {}
    fn fetch_started(&mut self, _pkg: &Package) {}
    fn fetch_progress(&mut self, _pkg: &Package, _percent: u8) {}
    fn extracting(&mut self, _pkg: &Package) {}
    fn removing(&mut self, _pkg: &Package) {}
    fn remove_progress(&mut self, _pkg: &Package, _percent: u8) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {}

/// Packages written by an install or upgrade
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Names in extraction order, the requested package last
    pub extracted: Vec<String>,
    pub broken: Vec<BrokenDependency>,
}

#[derive(Debug, Clone)]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed(Report),
}

#[derive(Debug, Clone)]
pub enum UpgradeOutcome {
    UpToDate,
    Upgraded(Report),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(RemovalSummary),
    /// Installed packages that still depend on the package
    Refused { blockers: Vec<String> },
}

impl Store {
    /// Install `pkg` and every missing dependency.
    ///
    /// Nothing is extracted unless every archive could be fetched. Broken
    /// dependencies are reported but do not stop the install.
    pub fn install(
        &mut self,
        pkg: &Package,
        fetcher: &dyn Fetcher,
        observer: &mut dyn Observer,
    ) -> Result<InstallOutcome> {
        if self.is_installed(pkg) {
            info!("{} is already installed", pkg.name());
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let resolution = self.resolve(pkg);
        for broken in &resolution.broken {
            observer.broken_dependency(broken);
        }

        let mut targets: Vec<Package> = resolution
            .packages
            .into_iter()
            .filter(|dep| !self.is_installed(dep))
            .collect();
        targets.push(pkg.clone());

        let archives = self.fetch_all(&targets, fetcher, observer)?;

        let result = self.extract_all(&targets, &archives, false, observer);
        self.reload()?;

        Ok(InstallOutcome::Installed(Report {
            extracted: result?,
            broken: resolution.broken,
        }))
    }

    /// Replace an installed package with the newer catalog version `pkg`.
    ///
    /// Dependencies that are missing or themselves outdated are brought along.
    /// Old versions are removed right before their replacement is extracted.
    pub fn upgrade(
        &mut self,
        pkg: &Package,
        fetcher: &dyn Fetcher,
        observer: &mut dyn Observer,
    ) -> Result<UpgradeOutcome> {
        if !self.is_installed(pkg) {
            return Err(Error::NotInstalled(pkg.name().to_string()));
        }
        if !self.is_upgradable(pkg) {
            info!("{} is up to date", pkg.name());
            return Ok(UpgradeOutcome::UpToDate);
        }

        let resolution = self.resolve(pkg);
        for broken in &resolution.broken {
            observer.broken_dependency(broken);
        }

        let mut targets: Vec<Package> = resolution
            .packages
            .into_iter()
            .filter(|dep| !self.is_installed(dep) || self.is_upgradable(dep))
            .collect();
        targets.push(pkg.clone());

        let archives = self.fetch_all(&targets, fetcher, observer)?;

        let result = self.extract_all(&targets, &archives, true, observer);
        self.reload()?;

        Ok(UpgradeOutcome::Upgraded(Report {
            extracted: result?,
            broken: resolution.broken,
        }))
    }

    /// Remove an installed package.
    ///
    /// Without `force`, a package that other installed packages depend on is
    /// refused and nothing is touched.
    pub fn uninstall(
        &mut self,
        name: &str,
        force: bool,
        observer: &mut dyn Observer,
    ) -> Result<RemoveOutcome> {
        let pkg = self
            .installed_package(name)
            .cloned()
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

        if !force {
            let blockers: Vec<String> = self
                .dependents(name)
                .iter()
                .map(|p| p.name().to_string())
                .collect();
            if !blockers.is_empty() {
                warn!("Refusing to remove {}: needed by {}", name, blockers.join(", "));
                return Ok(RemoveOutcome::Refused { blockers });
            }
        }

        let result = self.remove_installed(&pkg, observer);
        self.reload()?;
        Ok(RemoveOutcome::Removed(result?))
    }

    /// Remove a package after removing, depth first, everything that depends
    /// on it. Returns the names in removal order.
    pub fn recursive_remove(&mut self, name: &str, observer: &mut dyn Observer) -> Result<Vec<String>> {
        if self.installed_package(name).is_none() {
            return Err(Error::NotInstalled(name.to_string()));
        }

        let mut visiting = HashSet::new();
        let mut removed = Vec::new();
        self.remove_tree(name, &mut visiting, &mut removed, observer)?;
        Ok(removed)
    }

    fn remove_tree(
        &mut self,
        name: &str,
        visiting: &mut HashSet<String>,
        removed: &mut Vec<String>,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        if !visiting.insert(name.to_string()) {
            return Ok(());
        }

        let dependents: Vec<String> = self
            .dependents(name)
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        for dependent in dependents {
            self.remove_tree(&dependent, visiting, removed, observer)?;
        }

        // Already removed through another path of a dependency cycle
        if self.installed_package(name).is_none() {
            return Ok(());
        }

        self.uninstall(name, true, observer)?;
        removed.push(name.to_string());
        Ok(())
    }

    /// Fetch every archive, stopping at the first failure
    fn fetch_all(
        &self,
        targets: &[Package],
        fetcher: &dyn Fetcher,
        observer: &mut dyn Observer,
    ) -> Result<Vec<PathBuf>> {
        let cache_dir = self.layout().cache_dir();
        let mut archives = Vec::with_capacity(targets.len());

        for pkg in targets {
            observer.fetch_started(pkg);
            let fetched = {
                let mut sink = |percent: u8| observer.fetch_progress(pkg, percent);
                let mut progress = Progress::new(&mut sink);
                repository::fetch_package(fetcher, pkg, &cache_dir, &mut progress)
            };

            match fetched {
                Ok(path) => archives.push(path),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", pkg.name(), e);
                    return Err(e);
                }
            }
        }

        debug!("Fetched {} archives", archives.len());
        Ok(archives)
    }

    /// Extract fetched archives in order, removing the installed version
    /// first when `replace` is set
    fn extract_all(
        &self,
        targets: &[Package],
        archives: &[PathBuf],
        replace: bool,
        observer: &mut dyn Observer,
    ) -> Result<Vec<String>> {
        let mut extracted = Vec::with_capacity(targets.len());

        for (pkg, archive) in targets.iter().zip(archives) {
            if replace {
                if let Some(old) = self.installed_package(pkg.name()) {
                    info!("Removing {} {} before upgrade", old.name(), old.version());
                    self.remove_installed(old, observer)?;
                }
            }

            observer.extracting(pkg);
            filesystem::extract_package(self.layout(), pkg, archive)?;
            extracted.push(pkg.name().to_string());
        }

        Ok(extracted)
    }

    fn remove_installed(&self, pkg: &Package, observer: &mut dyn Observer) -> Result<RemovalSummary> {
        observer.removing(pkg);
        let mut sink = |percent: u8| observer.remove_progress(pkg, percent);
        let mut progress = Progress::new(&mut sink);
        filesystem::uninstall_package(self.layout(), pkg.name(), &mut progress)
    }
}
