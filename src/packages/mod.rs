// src/packages/mod.rs

//! Package metadata and the binary archive format
//!
//! `control` holds the stanza-backed `Package` record shared by the catalog
//! and the installed set; `deb` reads the AR/tar archives packages ship in.

pub mod control;
pub mod deb;

pub use control::Package;
pub use deb::DebArchive;
