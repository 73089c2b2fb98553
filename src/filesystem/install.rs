// src/filesystem/install.rs

//! Archive payload extraction
//!
//! Entries are written straight to their final location under the install
//! root, in archive order. Every path this attempt creates is tracked; if any
//! entry fails, those paths are removed again (deepest first) and nothing is
//! committed, so a failed install never shows up in the installed set.
//! Files that existed before and were overwritten are not restored.

use super::apply_mode;
use crate::db::{Layout, Manifest};
use crate::error::{Error, Result};
use crate::packages::Package;
use crate::packages::deb::{DebArchive, EntryKind, PayloadEntry};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extract `archive_path` for `pkg` and record it as installed.
///
/// The control stanza stored for the installed package is the one inside the
/// archive, and its name must match `pkg`.
pub fn extract_package(layout: &Layout, pkg: &Package, archive_path: &Path) -> Result<Manifest> {
    if !archive_path.is_file() {
        return Err(Error::NotFoundError(format!(
            "Archive for {} not found at {}",
            pkg.name(),
            archive_path.display()
        )));
    }

    let archive = DebArchive::open(archive_path)?;
    let control = archive.control()?;
    if control.name() != pkg.name() {
        return Err(Error::ArchiveError(format!(
            "{} contains package {}, expected {}",
            archive_path.display(),
            control.name(),
            pkg.name()
        )));
    }

    info!("Extracting {} {}", control.name(), control.version());

    let mut extraction = Extraction::new(layout.root());
    if let Err(e) = archive.for_each_payload_entry(|entry| extraction.apply(entry)) {
        warn!("Extraction of {} failed: {}", pkg.name(), e);
        extraction.rollback();
        return Err(e);
    }

    if let Err(e) = commit(layout, &control, &extraction.manifest) {
        warn!("Failed to record {} as installed: {}", pkg.name(), e);
        extraction.rollback();
        if let Ok(dir) = layout.package_dir(pkg.name()) {
            let _ = fs::remove_dir_all(dir);
        }
        return Err(e);
    }

    info!(
        "Installed {} ({} paths, {} bytes)",
        pkg.name(),
        extraction.manifest.len(),
        extraction.manifest.total_bytes()
    );
    Ok(extraction.manifest)
}

/// Write `control` and `files` into the package's state directory
fn commit(layout: &Layout, control: &Package, manifest: &Manifest) -> Result<()> {
    let dir = layout.package_dir(control.name())?;
    fs::create_dir_all(&dir)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", dir.display(), e)))?;

    let control_path = layout.control_path(control.name())?;
    fs::write(&control_path, control.to_string()).map_err(|e| {
        Error::IoError(format!("Failed to write {}: {}", control_path.display(), e))
    })?;

    manifest.save(&layout.manifest_path(control.name())?)?;
    debug!("Committed state for {} in {}", control.name(), dir.display());
    Ok(())
}

/// In-progress extraction of one archive
struct Extraction<'a> {
    root: &'a Path,
    manifest: Manifest,
    /// Paths created or written by this attempt, in creation order
    created: Vec<PathBuf>,
}

impl<'a> Extraction<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            manifest: Manifest::new(),
            created: Vec::new(),
        }
    }

    fn apply(&mut self, entry: PayloadEntry<'_>) -> Result<()> {
        let dest = self.root.join(&entry.path);

        match entry.kind {
            // Only directories this install creates are recorded
            EntryKind::Directory => self.create_dir(&dest)?,
            EntryKind::File => {
                self.prepare_parent(&dest)?;
                self.clear_target(&dest)?;
                let written = self.write_file(&dest, entry.data, entry.size)?;
                apply_mode(&dest, entry.mode).map_err(|e| {
                    Error::IoError(format!("Failed to set mode on {}: {}", dest.display(), e))
                })?;
                debug!("Wrote {} ({} bytes, mode {:o})", dest.display(), written, entry.mode);
                self.manifest.push(dest, Some(written));
            }
            EntryKind::Symlink(target) => {
                self.prepare_parent(&dest)?;
                self.clear_target(&dest)?;
                if self.create_symlink(&target, &dest)? {
                    self.manifest.push(dest, None);
                }
            }
            EntryKind::Unsupported(kind) => {
                warn!("Skipping {}: unsupported entry type {:?}", entry.path.display(), kind);
            }
        }

        Ok(())
    }

    /// Create a directory and any missing parents, recording the new ones.
    ///
    /// Parents the archive never lists still belong to the package. A
    /// directory that already exists is left out of the manifest, even when
    /// the archive lists it, so removal never takes it away.
    fn create_dir(&mut self, dir: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = Some(dir);

        while let Some(path) = current {
            if path == self.root || !path.starts_with(self.root) {
                break;
            }
            match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => break,
                Ok(_) => {
                    return Err(Error::IoError(format!(
                        "Cannot create directory {}: a file is in the way",
                        path.display()
                    )));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(path.to_path_buf()),
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "Failed to inspect {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
            current = path.parent();
        }

        for path in missing.into_iter().rev() {
            fs::create_dir(&path).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", path.display(), e))
            })?;
            debug!("Created directory {}", path.display());
            self.created.push(path.clone());
            self.manifest.push(path, None);
        }

        Ok(())
    }

    fn prepare_parent(&mut self, dest: &Path) -> Result<()> {
        match dest.parent() {
            Some(parent) => self.create_dir(parent),
            None => Ok(()),
        }
    }

    /// Remove a file or symlink occupying `dest`
    fn clear_target(&self, dest: &Path) -> Result<()> {
        match fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => Err(Error::IoError(format!(
                "Cannot write {}: a directory is in the way",
                dest.display()
            ))),
            Ok(_) => {
                debug!("Replacing existing {}", dest.display());
                fs::remove_file(dest).map_err(|e| {
                    Error::IoError(format!("Failed to replace {}: {}", dest.display(), e))
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::IoError(format!(
                "Failed to inspect {}: {}",
                dest.display(),
                e
            ))),
        }
    }

    /// Write exactly `size` bytes from `data`
    fn write_file(&mut self, dest: &Path, data: &mut dyn Read, size: u64) -> Result<u64> {
        let mut file = File::create(dest)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", dest.display(), e)))?;
        self.created.push(dest.to_path_buf());

        let written = io::copy(&mut data.take(size), &mut file)
            .map_err(|e| Error::ArchiveError(format!("Failed to extract {}: {}", dest.display(), e)))?;

        if written != size {
            return Err(Error::ArchiveError(format!(
                "Truncated entry {}: got {} of {} bytes",
                dest.display(),
                written,
                size
            )));
        }

        Ok(written)
    }

    #[cfg(unix)]
    fn create_symlink(&mut self, target: &Path, dest: &Path) -> Result<bool> {
        std::os::unix::fs::symlink(target, dest).map_err(|e| {
            Error::IoError(format!("Failed to create symlink {}: {}", dest.display(), e))
        })?;
        debug!("Linked {} -> {}", dest.display(), target.display());
        self.created.push(dest.to_path_buf());
        Ok(true)
    }

    #[cfg(not(unix))]
    fn create_symlink(&mut self, target: &Path, dest: &Path) -> Result<bool> {
        warn!(
            "Skipping symlink {} -> {}: not supported on this platform",
            dest.display(),
            target.display()
        );
        Ok(false)
    }

    /// Remove everything this attempt created, deepest first
    fn rollback(&mut self) {
        for path in self.created.drain(..).rev() {
            let result = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir(&path),
                Ok(_) => fs::remove_file(&path),
                Err(_) => continue,
            };
            match result {
                Ok(()) => debug!("Rolled back {}", path.display()),
                Err(e) => warn!("Failed to roll back {}: {}", path.display(), e),
            }
        }
    }
}
