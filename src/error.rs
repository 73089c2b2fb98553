// src/error.rs

use thiserror::Error;

/// Core error types for miniapt
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with the path or step that failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration file could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unparseable text data (catalog index, timestamps, numbers)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A control stanza without any `Key: Value` lines
    #[error("Malformed stanza: {0}")]
    MalformedStanza(String),

    /// A package record lacks a field an operation needs
    #[error("Package {package} has no {field} field")]
    MissingField { package: String, field: &'static str },

    /// Truncated or otherwise unusable package archive
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Transport failure while fetching catalog or archive data
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Package not present in the catalog
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Package is not installed
    #[error("Package {0} is not installed")]
    NotInstalled(String),
}

/// Result type alias using miniapt's Error type
pub type Result<T> = std::result::Result<T, Error>;
