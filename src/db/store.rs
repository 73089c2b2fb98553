// src/db/store.rs

//! The package store: available catalog plus installed set
//!
//! `available` is loaded from the persisted catalog and only ever replaced
//! wholesale by `refresh_catalog`. `installed` is never persisted as a whole;
//! it is rebuilt from the per-package control files every time the store is
//! loaded, so that it always matches what is actually on disk.
//!
//! There is no locking. Running two mutating operations against the same
//! root at once is undefined.

use super::Layout;
use crate::error::{Error, Result};
use crate::packages::Package;
use crate::repository::{Fetcher, Source, catalog};
use crate::resolver::{Resolution, Resolver};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Name-keyed catalog and installed set for one install tree
#[derive(Debug, Clone)]
pub struct Store {
    layout: Layout,
    available: BTreeMap<String, Package>,
    installed: BTreeMap<String, Package>,
}

impl Store {
    /// Open the store rooted at `root`, creating the tree if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_layout(Layout::new(root)?)
    }

    pub fn with_layout(layout: Layout) -> Result<Self> {
        let mut store = Self {
            layout,
            available: BTreeMap::new(),
            installed: BTreeMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Rebuild both maps from disk
    pub fn reload(&mut self) -> Result<()> {
        let (available, installed) = Self::load(&self.layout)?;
        self.available = available;
        self.installed = installed;
        Ok(())
    }

    /// Read the catalog and scan the installed packages of a tree
    #[allow(clippy::type_complexity)]
    pub fn load(
        layout: &Layout,
    ) -> Result<(BTreeMap<String, Package>, BTreeMap<String, Package>)> {
        layout.init()?;
        let available = load_catalog(&layout.catalog_path())?;
        let installed = scan_installed(layout)?;
        debug!(
            "Loaded {} available and {} installed packages",
            available.len(),
            installed.len()
        );
        Ok((available, installed))
    }

    /// Persist the catalog, one stanza per package
    ///
    /// The file is replaced atomically.
    pub fn save(&self) -> Result<()> {
        self.layout.init()?;
        let db_dir = self.layout.db_dir();
        let path = self.layout.catalog_path();

        let mut temp = NamedTempFile::new_in(&db_dir).map_err(|e| {
            Error::IoError(format!("Failed to create file in {}: {}", db_dir.display(), e))
        })?;

        for pkg in self.available.values() {
            writeln!(temp, "{}", pkg)
                .map_err(|e| Error::IoError(format!("Failed to write catalog: {}", e)))?;
        }

        temp.persist(&path).map_err(|e| {
            Error::IoError(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        debug!("Saved {} packages to {}", self.available.len(), path.display());
        Ok(())
    }

    /// Replace the catalog with the merged package lists of `sources`.
    ///
    /// A source that cannot be read at all is skipped. If no source yields
    /// anything the current catalog is kept and the last error is returned.
    pub fn refresh_catalog(&mut self, sources: &[Source], fetcher: &dyn Fetcher) -> Result<usize> {
        let mut lists = Vec::new();
        let mut last_error = None;

        for source in sources {
            match source.fetch_packages(fetcher) {
                Ok(packages) => lists.push(packages),
                Err(e) => {
                    warn!("Failed to sync {}: {}", source.url(), e);
                    last_error = Some(e);
                }
            }
        }

        if lists.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| Error::ConfigError("No repository sources configured".to_string())));
        }

        self.available = catalog::merge(lists)
            .into_iter()
            .map(|pkg| (pkg.name().to_string(), pkg))
            .collect();
        self.save()?;

        info!("Catalog refreshed: {} packages", self.available.len());
        Ok(self.available.len())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn available(&self) -> &BTreeMap<String, Package> {
        &self.available
    }

    pub fn installed(&self) -> &BTreeMap<String, Package> {
        &self.installed
    }

    pub fn available_package(&self, name: &str) -> Option<&Package> {
        self.available.get(name)
    }

    pub fn installed_package(&self, name: &str) -> Option<&Package> {
        self.installed.get(name)
    }

    pub fn is_installed(&self, pkg: &Package) -> bool {
        self.installed.contains_key(pkg.name())
    }

    /// Installed, and `pkg` is strictly newer than the installed version
    pub fn is_upgradable(&self, pkg: &Package) -> bool {
        self.installed
            .get(pkg.name())
            .is_some_and(|inst| pkg.version() > inst.version())
    }

    /// Catalog packages, optionally restricted to one section, sorted by name
    pub fn packages(&self, section: Option<&str>) -> Vec<&Package> {
        self.available
            .values()
            .filter(|p| section.is_none() || p.section() == section)
            .collect()
    }

    /// Installed packages that the catalog no longer lists
    pub fn installed_only(&self, section: Option<&str>) -> Vec<&Package> {
        self.installed
            .values()
            .filter(|p| !self.available.contains_key(p.name()))
            .filter(|p| section.is_none() || p.section() == section)
            .collect()
    }

    /// Catalog packages newer than their installed version
    pub fn upgradable(&self) -> Vec<&Package> {
        self.available
            .values()
            .filter(|p| self.is_upgradable(p))
            .collect()
    }

    /// Installed packages whose `Depends` names `name`
    pub fn dependents(&self, name: &str) -> Vec<&Package> {
        self.installed
            .values()
            .filter(|p| p.name() != name && p.dependency_names().contains(&name))
            .collect()
    }

    /// Transitive dependencies of `pkg` in the catalog
    pub fn resolve(&self, pkg: &Package) -> Resolution {
        Resolver::new(&self.available).resolve(pkg)
    }
}

/// Load the persisted catalog. A missing file is an empty catalog.
fn load_catalog(path: &Path) -> Result<BTreeMap<String, Package>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    let mut catalog = BTreeMap::new();
    for pkg in Package::parse_many(&text, None) {
        if pkg.repository().is_none() {
            warn!("Dropping catalog entry {} without Repository", pkg.name());
            continue;
        }
        catalog.insert(pkg.name().to_string(), pkg);
    }
    Ok(catalog)
}

/// Rebuild the installed set from `<packages_dir>/<name>/control`
fn scan_installed(layout: &Layout) -> Result<BTreeMap<String, Package>> {
    let packages_dir = layout.packages_dir();
    let mut installed = BTreeMap::new();

    let entries = fs::read_dir(&packages_dir).map_err(|e| {
        Error::IoError(format!("Failed to read {}: {}", packages_dir.display(), e))
    })?;

    for entry in entries {
        let entry = entry?;
        let dir_name = entry.file_name().to_string_lossy().to_string();

        if dir_name.starts_with('.') || !entry.file_type()?.is_dir() {
            continue;
        }

        let control = entry.path().join("control");
        if !control.is_file() {
            debug!("Ignoring {}: no control file", entry.path().display());
            continue;
        }

        if !entry.path().join("files").is_file() {
            warn!("Installed package {} has no file manifest", dir_name);
        }

        let text = fs::read_to_string(&control)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", control.display(), e)))?;

        for pkg in Package::parse_many(&text, None) {
            if pkg.name() != dir_name {
                warn!(
                    "Ignoring {}: control names package {}",
                    control.display(),
                    pkg.name()
                );
                continue;
            }
            installed.insert(pkg.name().to_string(), pkg);
        }
    }

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_pkg(name: &str, version: &str, section: &str) -> Package {
        Package::parse_from_repository(
            &format!(
                "Package: {}\nVersion: {}\nArchitecture: all\nSection: {}\nFilename: pool/{}.deb\n",
                name, version, section, name
            ),
            "http://repo.example.com",
        )
        .unwrap()
    }

    fn mark_installed(layout: &Layout, stanza: &str, name: &str) {
        let dir = layout.package_dir(name).unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("control"), stanza).unwrap();
        fs::write(dir.join("files"), "").unwrap();
    }

    fn store_with(packages: Vec<Package>) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.available = packages
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        store.save().unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(store.available().is_empty());
        assert!(store.installed().is_empty());
        assert!(store.layout().packages_dir().is_dir());
    }

    #[test]
    fn test_save_and_reload_keeps_repository() {
        let (dir, store) = store_with(vec![
            catalog_pkg("alpha", "1.0", "cores"),
            catalog_pkg("beta", "2.0~rc1", "plugins"),
        ]);

        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.available(), store.available());
        assert!(reopened
            .available()
            .values()
            .all(|p| p.repository() == Some("http://repo.example.com")));
    }

    #[test]
    fn test_catalog_entries_without_repository_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        layout.init().unwrap();
        fs::write(
            layout.catalog_path(),
            "Package: a\nVersion: 1\nRepository: http://r\n\nPackage: b\nVersion: 1\n",
        )
        .unwrap();

        let store = Store::with_layout(layout).unwrap();
        assert_eq!(store.available().keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_installed_scan() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path()).unwrap();
        layout.init().unwrap();

        mark_installed(&layout, "Package: tool\nVersion: 1.0\n", "tool");
        // Hidden directory
        let hidden = layout.packages_dir().join(".partial");
        fs::create_dir_all(&hidden).unwrap();
        fs::write(hidden.join("control"), "Package: ghost\nVersion: 1\n").unwrap();
        // Directory without control
        fs::create_dir_all(layout.packages_dir().join("empty")).unwrap();
        // Stray file
        fs::write(layout.packages_dir().join("README"), "hi").unwrap();

        let store = Store::with_layout(layout).unwrap();
        assert_eq!(store.installed().keys().collect::<Vec<_>>(), vec!["tool"]);
        assert_eq!(store.installed_package("tool").unwrap().repository(), None);
    }

    #[test]
    fn test_upgrade_detection() {
        let (_dir, mut store) = store_with(vec![
            catalog_pkg("tool", "1.1", "cores"),
            catalog_pkg("fresh", "1.0", "cores"),
        ]);
        mark_installed(store.layout(), "Package: tool\nVersion: 1.0\n", "tool");
        store.reload().unwrap();

        let tool = store.available_package("tool").unwrap().clone();
        let fresh = store.available_package("fresh").unwrap().clone();

        assert!(store.is_installed(&tool));
        assert!(store.is_upgradable(&tool));
        assert!(!store.is_installed(&fresh));
        assert!(!store.is_upgradable(&fresh));

        let names: Vec<_> = store.upgradable().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["tool"]);
    }

    #[test]
    fn test_same_version_is_not_upgradable() {
        let (_dir, mut store) = store_with(vec![catalog_pkg("tool", "1.0", "cores")]);
        mark_installed(store.layout(), "Package: tool\nVersion: 1.0\n", "tool");
        store.reload().unwrap();

        let tool = store.available_package("tool").unwrap().clone();
        assert!(!store.is_upgradable(&tool));
    }

    #[test]
    fn test_packages_by_section() {
        let (_dir, store) = store_with(vec![
            catalog_pkg("b", "1", "cores"),
            catalog_pkg("a", "1", "cores"),
            catalog_pkg("c", "1", "plugins"),
        ]);

        let cores: Vec<_> = store.packages(Some("cores")).iter().map(|p| p.name()).collect();
        assert_eq!(cores, vec!["a", "b"]);
        assert_eq!(store.packages(None).len(), 3);
        assert!(store.packages(Some("boards")).is_empty());
    }

    #[test]
    fn test_installed_only_and_dependents() {
        let (_dir, mut store) = store_with(vec![catalog_pkg("lib", "1", "cores")]);
        mark_installed(store.layout(), "Package: lib\nVersion: 1\n", "lib");
        mark_installed(store.layout(), "Package: app\nVersion: 1\nDepends: lib\n", "app");
        mark_installed(store.layout(), "Package: tool\nVersion: 1\nDepends: libx\n", "tool");
        store.reload().unwrap();

        let orphans: Vec<_> = store.installed_only(None).iter().map(|p| p.name()).collect();
        assert_eq!(orphans, vec!["app", "tool"]);

        let dependents: Vec<_> = store.dependents("lib").iter().map(|p| p.name()).collect();
        assert_eq!(dependents, vec!["app"]);
        assert!(store.dependents("app").is_empty());
    }
}
