// src/repository/source.rs

//! Debian-style repository sources
//!
//! A source is a repository root plus a distribution, an architecture and a
//! list of sections. Each section publishes a gzip-compressed stanza list at
//! `<root>/dists/<distribution>/<section>/binary-<arch>/Packages.gz`.

use super::Fetcher;
use super::catalog;
use crate::error::{Error, Result};
use crate::packages::Package;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::{debug, info, warn};

/// A repository source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Repository root URL, recorded on every package as `Repository`
    url: String,
    /// Distribution name (e.g., "uecide", "noble")
    distribution: String,
    /// Architecture (e.g., "linux-amd64")
    architecture: String,
    /// Sections (e.g., "cores", "plugins")
    sections: Vec<String>,
}

impl Source {
    pub fn new(
        url: impl Into<String>,
        distribution: impl Into<String>,
        architecture: impl Into<String>,
        sections: Vec<String>,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            distribution: distribution.into(),
            architecture: architecture.into(),
            sections,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// URL of the `Packages.gz` index for one section
    pub fn section_url(&self, section: &str) -> String {
        format!(
            "{}/dists/{}/{}/binary-{}/Packages.gz",
            self.url, self.distribution, section, self.architecture
        )
    }

    /// Fetch and parse one section's package list
    pub fn fetch_section(&self, fetcher: &dyn Fetcher, section: &str) -> Result<Vec<Package>> {
        let url = self.section_url(section);
        debug!("Downloading package index from: {}", url);

        let bytes = fetcher.fetch_bytes(&url)?;
        let text = decompress_index(&bytes)?;
        let packages = Package::parse_many(&text, Some(&self.url));

        debug!("Parsed {} packages from {}", packages.len(), url);
        Ok(packages)
    }

    /// Fetch every section and fold them into one newest-wins list.
    ///
    /// A failing section is logged and skipped. Fails only when no section
    /// could be read at all.
    pub fn fetch_packages(&self, fetcher: &dyn Fetcher) -> Result<Vec<Package>> {
        info!(
            "Syncing repository: {} ({}/{})",
            self.url, self.distribution, self.architecture
        );

        let mut sections = Vec::new();
        let mut last_error = None;

        for section in &self.sections {
            match self.fetch_section(fetcher, section) {
                Ok(packages) => sections.push(packages),
                Err(e) => {
                    warn!("Skipping section {} of {}: {}", section, self.url, e);
                    last_error = Some(e);
                }
            }
        }

        if sections.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                Error::ConfigError(format!("Source {} has no sections", self.url))
            }));
        }

        let packages = catalog::merge(sections);
        info!("Parsed {} packages from {}", packages.len(), self.url);
        Ok(packages)
    }
}

/// Gunzip a `Packages.gz` body into text
pub fn decompress_index(bytes: &[u8]) -> Result<String> {
    let mut gz = GzDecoder::new(bytes);
    let mut decompressed = String::new();
    gz.read_to_string(&mut decompressed)
        .map_err(|e| Error::ParseError(format!("Failed to decompress Packages.gz: {}", e)))?;
    Ok(decompressed)
}
