// src/db/manifest.rs

//! Installed-file manifests
//!
//! The manifest is the only record of what a package put on disk. It is
//! written once at the end of an extraction and read back when the package is
//! removed; the filesystem is never rescanned to find a package's files.
//! On disk it is one absolute path per line, directories included.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One path written during extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    /// Bytes written for regular files; `None` for directories, links, and
    /// entries read back from disk
    pub size: Option<u64>,
}

/// Ordered, duplicate-free list of installed paths
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    seen: HashSet<PathBuf>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path; repeated paths keep their first position
    pub fn push(&mut self, path: PathBuf, size: Option<u64>) {
        if self.seen.insert(path.clone()) {
            self.entries.push(ManifestEntry { path, size });
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes written for regular files
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size).sum()
    }

    /// Read a manifest file; blank lines are ignored
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;

        let mut manifest = Self::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            manifest.push(PathBuf::from(line), None);
        }
        Ok(manifest)
    }

    /// Write the manifest, one path per line.
    ///
    /// Paths that cannot be written back verbatim are refused.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = String::new();
        for entry in &self.entries {
            let line = entry
                .path
                .to_str()
                .filter(|p| !p.contains(['\n', '\r']))
                .ok_or_else(|| {
                    Error::IoError(format!(
                        "Cannot record {} in manifest",
                        entry.path.display()
                    ))
                })?;
            content.push_str(line);
            content.push('\n');
        }

        fs::write(path, content).map_err(|e| {
            Error::IoError(format!("Failed to write manifest {}: {}", path.display(), e))
        })
    }
}
