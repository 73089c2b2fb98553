// src/lib.rs

//! miniapt
//!
//! A small Debian-style package manager for self-contained install trees.
//! It keeps a catalog of packages published by remote repositories, resolves
//! dependencies by name, and installs `.deb` archives into a root directory,
//! tracking every installed path so packages can be removed cleanly.
//!
//! # Architecture
//!
//! - Plain-file state: the catalog and each installed package's control
//!   stanza and file manifest live under `<root>/apt`
//! - The installed set is always rebuilt from disk, never cached
//! - Fetch first, then write: an install touches the tree only once every
//!   archive is in the local cache
//! - Debian version ordering (epoch, upstream, revision, `~` pre-releases)
//!
//! # Concurrency
//!
//! Everything runs on the caller's thread with blocking I/O. There is no
//! locking of the install tree: running two mutating operations against the
//! same root at the same time is undefined.

pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod packages;
pub mod progress;
pub mod repository;
pub mod resolver;
pub mod transaction;
pub mod version;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use db::Store;
pub use error::{Error, Result};
pub use packages::Package;
pub use transaction::{InstallOutcome, Observer, RemoveOutcome, Silent, UpgradeOutcome};
pub use version::Version;
