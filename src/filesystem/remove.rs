// src/filesystem/remove.rs

//! Manifest-driven removal
//!
//! Plain files go first, then directories in reverse lexical order so that
//! children are always attempted before their parents. A directory that is
//! still in use by another package is simply left behind.

use crate::db::{Layout, Manifest};
use crate::error::{Error, Result};
use crate::progress::Progress;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a removal actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub files: usize,
    pub directories: usize,
    /// Directories left in place because they still had contents
    pub kept_directories: Vec<PathBuf>,
}

/// Delete every path in `manifest` that lies under `root`.
///
/// Paths that are already gone are ignored. Any other failure stops the
/// removal immediately.
pub fn remove_files(
    root: &Path,
    manifest: &Manifest,
    progress: &mut Progress<'_>,
) -> Result<RemovalSummary> {
    let mut files = Vec::new();
    let mut directories = Vec::new();

    for path in manifest.paths() {
        if !path.starts_with(root) {
            warn!("Ignoring manifest entry outside {}: {}", root.display(), path.display());
            continue;
        }
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => directories.push(path.to_path_buf()),
            Ok(_) => files.push(path.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already removed", path.display());
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to inspect {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    let mut summary = RemovalSummary::default();

    for (i, file) in files.iter().enumerate() {
        match fs::remove_file(file) {
            Ok(()) => summary.files += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to remove {}: {}",
                    file.display(),
                    e
                )));
            }
        }
        progress.set(phase_percent(0, i + 1, files.len()));
    }
    progress.set(50);

    directories.sort();
    let total = directories.len();
    for (i, dir) in directories.into_iter().rev().enumerate() {
        match fs::remove_dir(&dir) {
            Ok(()) => summary.directories += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                debug!("Keeping {}: not empty", dir.display());
                summary.kept_directories.push(dir);
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to remove directory {}: {}",
                    dir.display(),
                    e
                )));
            }
        }
        progress.set(phase_percent(50, i + 1, total));
    }
    progress.finish();

    Ok(summary)
}

/// Remove an installed package's files and its state directory.
///
/// A missing manifest is treated as empty. The state directory is only
/// deleted once every file removal succeeded, so a failed removal can be
/// retried.
pub fn uninstall_package(
    layout: &Layout,
    name: &str,
    progress: &mut Progress<'_>,
) -> Result<RemovalSummary> {
    let manifest_path = layout.manifest_path(name)?;
    let manifest = if manifest_path.exists() {
        Manifest::load(&manifest_path)?
    } else {
        warn!("No file manifest for {}, removing state only", name);
        Manifest::new()
    };

    let summary = remove_files(layout.root(), &manifest, progress)?;

    let state_dir = layout.package_dir(name)?;
    for file in [manifest_path, layout.control_path(name)?] {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to remove {}: {}",
                    file.display(),
                    e
                )));
            }
        }
    }
    if state_dir.exists() {
        fs::remove_dir_all(&state_dir).map_err(|e| {
            Error::IoError(format!("Failed to remove {}: {}", state_dir.display(), e))
        })?;
    }

    info!(
        "Removed {} ({} files, {} directories, {} kept)",
        name,
        summary.files,
        summary.directories,
        summary.kept_directories.len()
    );
    Ok(summary)
}

/// Map step `done` of `total` onto the 50-point band starting at `base`
fn phase_percent(base: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return base + 50;
    }
    base + (done.min(total) * 50 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (tempfile::TempDir, Layout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("root")).unwrap();
        layout.init().unwrap();
        (dir, layout)
    }

    fn install_fake(layout: &Layout, name: &str, paths: &[&str]) -> Manifest {
        let mut manifest = Manifest::new();
        for rel in paths {
            let path = layout.root().join(rel.trim_end_matches('/'));
            if rel.ends_with('/') {
                fs::create_dir_all(&path).unwrap();
                manifest.push(path, None);
            } else {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, rel.as_bytes()).unwrap();
                manifest.push(path, Some(rel.len() as u64));
            }
        }
        let state = layout.package_dir(name).unwrap();
        fs::create_dir_all(&state).unwrap();
        fs::write(state.join("control"), format!("Package: {}\n", name)).unwrap();
        manifest.save(&state.join("files")).unwrap();
        manifest
    }

    #[test]
    fn test_phase_percent() {
        assert_eq!(phase_percent(0, 0, 0), 50);
        assert_eq!(phase_percent(0, 1, 2), 25);
        assert_eq!(phase_percent(50, 2, 2), 100);
        assert_eq!(phase_percent(50, 0, 0), 100);
    }

    #[test]
    fn test_remove_files_then_directories() {
        let (_dir, layout) = tree();
        let manifest = install_fake(
            &layout,
            "blink",
            &["usr/", "usr/bin/", "usr/bin/blink", "usr/share/", "usr/share/doc"],
        );

        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut progress = Progress::new(&mut sink);
        let summary = remove_files(layout.root(), &manifest, &mut progress).unwrap();
        drop(progress);

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 3);
        assert!(summary.kept_directories.is_empty());
        assert!(!layout.root().join("usr").exists());
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.contains(&50));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_shared_directory_is_kept() {
        let (_dir, layout) = tree();
        let manifest = install_fake(&layout, "blink", &["opt/", "opt/blink"]);
        fs::write(layout.root().join("opt/other"), b"someone else").unwrap();

        let summary = remove_files(layout.root(), &manifest, &mut Progress::silent()).unwrap();
        assert_eq!(summary.kept_directories, vec![layout.root().join("opt")]);
        assert!(layout.root().join("opt/other").exists());
        assert!(!layout.root().join("opt/blink").exists());
    }

    #[test]
    fn test_missing_paths_are_ignored() {
        let (_dir, layout) = tree();
        let manifest = install_fake(&layout, "blink", &["a/", "a/b"]);
        fs::remove_file(layout.root().join("a/b")).unwrap();

        let summary = remove_files(layout.root(), &manifest, &mut Progress::silent()).unwrap();
        assert_eq!(summary.files, 0);
        assert_eq!(summary.directories, 1);
    }

    #[test]
    fn test_paths_outside_root_are_untouched() {
        let (dir, layout) = tree();
        let outside = dir.path().join("precious");
        fs::write(&outside, b"keep").unwrap();

        let mut manifest = Manifest::new();
        manifest.push(outside.clone(), None);

        remove_files(layout.root(), &manifest, &mut Progress::silent()).unwrap();
        assert!(outside.exists());
    }

    #[test]
    fn test_uninstall_package_drops_state() {
        let (_dir, layout) = tree();
        install_fake(&layout, "blink", &["etc/", "etc/blink.conf"]);

        uninstall_package(&layout, "blink", &mut Progress::silent()).unwrap();
        assert!(!layout.package_dir("blink").unwrap().exists());
        assert!(!layout.root().join("etc").exists());
    }

    #[test]
    fn test_failed_removal_keeps_state_for_retry() {
        let (_dir, layout) = tree();
        install_fake(&layout, "blink", &["opt/", "opt/blink"]);
        // A regular file where the manifest expects a directory
        let blocked = layout.root().join("srv");
        fs::write(&blocked, b"not a dir").unwrap();
        let mut manifest = Manifest::load(&layout.manifest_path("blink").unwrap()).unwrap();
        manifest.push(blocked.join("data"), None);
        manifest.save(&layout.manifest_path("blink").unwrap()).unwrap();

        let result = uninstall_package(&layout, "blink", &mut Progress::silent());
        assert!(matches!(result, Err(Error::IoError(_))));
        assert!(layout.manifest_path("blink").unwrap().exists());
        assert!(layout.control_path("blink").unwrap().exists());

        // Clearing the obstacle lets the removal be retried
        fs::remove_file(&blocked).unwrap();
        uninstall_package(&layout, "blink", &mut Progress::silent()).unwrap();
        assert!(!layout.package_dir("blink").unwrap().exists());
        assert!(!layout.root().join("opt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_error_aborts_removal() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, layout) = tree();
        install_fake(&layout, "blink", &["lock/", "lock/held"]);
        let lock = layout.root().join("lock");
        fs::set_permissions(&lock, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions
        let writable = fs::write(lock.join(".check"), b"").is_ok();
        if writable {
            fs::remove_file(lock.join(".check")).unwrap();
            fs::set_permissions(&lock, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = uninstall_package(&layout, "blink", &mut Progress::silent());
        fs::set_permissions(&lock, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(Error::IoError(_))));
        assert!(lock.join("held").exists());
        assert!(layout.manifest_path("blink").unwrap().exists());
        assert!(layout.control_path("blink").unwrap().exists());
    }

    #[test]
    fn test_uninstall_without_manifest() {
        let (_dir, layout) = tree();
        let state = layout.package_dir("ghost").unwrap();
        fs::create_dir_all(&state).unwrap();
        fs::write(state.join("control"), "Package: ghost\n").unwrap();

        let summary = uninstall_package(&layout, "ghost", &mut Progress::silent()).unwrap();
        assert_eq!(summary, RemovalSummary::default());
        assert!(!state.exists());
    }
}
