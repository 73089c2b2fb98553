// src/filesystem/mod.rs

//! Filesystem side of installs and removals
//!
//! - `install`: materialize an archive's payload under the install root and
//!   commit the control stanza and file manifest
//! - `remove`: delete everything a manifest lists, then drop the package's
//!   state directory

pub mod install;
pub mod remove;

pub use install::extract_package;
pub use remove::{RemovalSummary, remove_files, uninstall_package};

use std::fs;
use std::io;
use std::path::Path;

/// Apply archive mode bits to a materialized file
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(mode & 0o777);
    }
    #[cfg(not(unix))]
    {
        perms.set_readonly(mode & 0o200 == 0);
    }
    fs::set_permissions(path, perms)
}
