// src/config.rs

//! Repository source configuration
//!
//! Stored as JSON in `<root>/apt/sources.json`. Every field has a default, so
//! a partial file (or no file at all) still yields a usable configuration.

use crate::error::{Error, Result};
use crate::repository::{HTTP_TIMEOUT, MAX_RETRIES, RepositoryClient, Source};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One repository to pull catalogs from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub distribution: String,
    pub architecture: String,
    #[serde(default)]
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    /// Network timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig {
        url: "http://dist.majenko.co.uk".to_string(),
        distribution: "uecide".to_string(),
        architecture: "linux-amd64".to_string(),
        sections: ["cores", "boards", "compilers", "plugins"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }]
}

fn default_timeout_secs() -> u64 {
    HTTP_TIMEOUT.as_secs()
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Read the configuration at `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        debug!("Loaded {} sources from {}", config.sources.len(), path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(|e| {
            Error::ConfigError(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    pub fn sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|s| {
                Source::new(
                    &s.url,
                    &s.distribution,
                    &s.architecture,
                    s.sections.clone(),
                )
            })
            .collect()
    }

    /// HTTP client honouring the timeout and retry settings
    pub fn client(&self) -> Result<RepositoryClient> {
        RepositoryClient::with_settings(Duration::from_secs(self.timeout_secs), self.max_retries)
    }
}
