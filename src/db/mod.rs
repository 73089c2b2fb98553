// src/db/mod.rs

//! Package database for miniapt
//!
//! This module handles all persistent package state:
//! - The on-disk layout of the install tree (`Layout`)
//! - The persisted catalog and the scanned installed set (`Store`)
//! - Per-package installed-file manifests (`manifest`)
//!
//! Everything lives in plain files under `<root>/apt`:
//!
//! ```text
//! apt/db/packages.db             catalog, one stanza per package
//! apt/db/packages/<name>/control installed package's control stanza
//! apt/db/packages/<name>/files   installed package's manifest
//! apt/cache/                     downloaded archives
//! apt/sources.json               configuration
//! ```

pub mod manifest;
pub mod store;

pub use manifest::{Manifest, ManifestEntry};
pub use store::Store;

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths of the install tree rooted at one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`, made absolute so that manifests record
    /// absolute paths
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref()).map_err(|e| {
            Error::IoError(format!(
                "Failed to resolve install root {}: {}",
                root.as_ref().display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Create the directory tree. Safe to call on an existing tree.
    pub fn init(&self) -> Result<()> {
        for dir in [self.db_dir(), self.cache_dir(), self.packages_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        debug!("Install tree ready at {}", self.root.display());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn apt_dir(&self) -> PathBuf {
        self.root.join("apt")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.apt_dir().join("db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.apt_dir().join("cache")
    }

    /// Parent of the per-package state directories
    pub fn packages_dir(&self) -> PathBuf {
        self.db_dir().join("packages")
    }

    /// Persisted catalog file
    pub fn catalog_path(&self) -> PathBuf {
        self.db_dir().join("packages.db")
    }

    /// Default configuration file
    pub fn config_path(&self) -> PathBuf {
        self.apt_dir().join("sources.json")
    }

    /// State directory of an installed package
    ///
    /// Rejects names that would leave the packages directory.
    pub fn package_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(Error::ParseError(format!(
                "Invalid package name for state directory: {:?}",
                name
            )));
        }
        Ok(self.packages_dir().join(name))
    }

    pub fn control_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.package_dir(name)?.join("control"))
    }

    pub fn manifest_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.package_dir(name)?.join("files"))
    }
}
