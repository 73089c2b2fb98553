// src/repository/mod.rs

//! Repository access and package downloading
//!
//! This module provides functionality for:
//! - Fetching raw catalog and archive bytes (`Fetcher`)
//! - Downloading archives into the local cache with size-based reuse
//! - Reading per-section catalogs from sources (`source`)
//! - Merging catalogs from several sources (`catalog`)

pub mod catalog;
pub mod source;

pub use catalog::merge;
pub use source::Source;

use crate::error::{Error, Result};
use crate::packages::Package;
use crate::progress::Progress;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed requests
pub const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// Transport used to fetch catalog indexes and package archives
pub trait Fetcher {
    /// Fetch the complete body at `url`
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// Download `url` to `dest`, reporting percentage progress.
    ///
    /// Returns the size of the file at `dest`. Implementations skip the
    /// transfer when `dest` already has the advertised length and must not
    /// leave a partial file behind on failure.
    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &mut Progress<'_>) -> Result<u64>;
}

/// HTTP client wrapper with retry support
///
/// Also serves `file://` URLs straight from disk, for local mirrors.
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(HTTP_TIMEOUT, MAX_RETRIES)
    }

    /// Create a client with a custom timeout and retry budget
    pub fn with_settings(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    /// Send a GET request, retrying transport errors with a growing delay
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for RepositoryClient {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = local_path(url) {
            return fs::read(&path).map_err(|e| {
                Error::DownloadError(format!("Failed to read {}: {}", path.display(), e))
            });
        }

        let response = self.get(url)?;
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {}", e)))?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &mut Progress<'_>) -> Result<u64> {
        if let Some(path) = local_path(url) {
            let file = File::open(&path).map_err(|e| {
                Error::DownloadError(format!("Failed to open {}: {}", path.display(), e))
            })?;
            let length = file.metadata()?.len();
            return stream_to_file(file, Some(length), dest, progress);
        }

        let response = self.get(url)?;
        let length = response.content_length();
        stream_to_file(response, length, dest, progress)
    }
}

/// Filesystem path behind a `file://` URL
fn local_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}

/// Stream `reader` into `dest`.
///
/// When `content_length` is known and `dest` already has exactly that size,
/// nothing is read and the existing file is kept. Otherwise the data goes to
/// a temporary file next to `dest` which is renamed into place only after the
/// full length has arrived; on any failure the temporary file is removed.
pub fn stream_to_file<R: Read>(
    mut reader: R,
    content_length: Option<u64>,
    dest: &Path,
    progress: &mut Progress<'_>,
) -> Result<u64> {
    if let Some(expected) = content_length {
        if let Ok(meta) = fs::metadata(dest) {
            if meta.is_file() && meta.len() == expected {
                debug!("{} already cached ({} bytes)", dest.display(), expected);
                progress.finish();
                return Ok(expected);
            }
        }
    }

    let parent = dest
        .parent()
        .ok_or_else(|| Error::IoError(format!("{} has no parent directory", dest.display())))?;
    fs::create_dir_all(parent).map_err(|e| {
        Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
    })?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        Error::IoError(format!("Failed to create file in {}: {}", parent.display(), e))
    })?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| Error::DownloadError(format!("Failed to read download data: {}", e)))?;
        if n == 0 {
            break;
        }
        temp.write_all(&buffer[..n])
            .map_err(|e| Error::IoError(format!("Failed to write downloaded data: {}", e)))?;
        written += n as u64;

        if let Some(total) = content_length {
            progress.update(written, total);
        }
    }

    if let Some(expected) = content_length {
        if written != expected {
            return Err(Error::DownloadError(format!(
                "Short download for {}: got {} of {} bytes",
                dest.display(),
                written,
                expected
            )));
        }
    }

    temp.persist(dest).map_err(|e| {
        Error::IoError(format!("Failed to move download to {}: {}", dest.display(), e))
    })?;

    progress.finish();
    Ok(written)
}

/// Download a package archive into `cache_dir`, named by its archive filename
pub fn fetch_package(
    fetcher: &dyn Fetcher,
    pkg: &Package,
    cache_dir: &Path,
    progress: &mut Progress<'_>,
) -> Result<PathBuf> {
    let dest = cache_dir.join(pkg.archive_filename()?);
    let url = pkg.source_uri()?;

    info!("Downloading {}", url);
    let size = fetcher.fetch_to_file(&url, &dest, progress)?;
    info!("Fetched {} ({} bytes)", dest.display(), size);

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader {
        sent: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::other("connection reset"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"half");
            Ok(4)
        }
    }

    #[test]
    fn test_stream_to_file_writes_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cache/pkg_1.0_all.deb");
        let data = vec![7u8; 200_000];

        let mut seen = Vec::new();
        let mut sink = |p: u8| seen.push(p);
        let mut progress = Progress::new(&mut sink);
        let size = stream_to_file(&data[..], Some(data.len() as u64), &dest, &mut progress).unwrap();
        drop(progress);

        assert_eq!(size, 200_000);
        assert_eq!(fs::read(&dest).unwrap(), data);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_stream_to_file_skips_when_size_matches() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.deb");
        fs::write(&dest, b"cached!").unwrap();

        // A reader that would fail if touched
        let reader = FailingReader { sent: true };
        let size = stream_to_file(reader, Some(7), &dest, &mut Progress::silent()).unwrap();

        assert_eq!(size, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"cached!");
    }

    #[test]
    fn test_stream_to_file_replaces_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.deb");
        fs::write(&dest, b"stale").unwrap();

        stream_to_file(&b"fresh data"[..], Some(10), &dest, &mut Progress::silent()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"fresh data");
    }

    #[test]
    fn test_stream_to_file_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.deb");

        let result = stream_to_file(
            FailingReader { sent: false },
            Some(100),
            &dest,
            &mut Progress::silent(),
        );

        assert!(matches!(result, Err(Error::DownloadError(_))));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_to_file_short_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.deb");

        let result = stream_to_file(&b"abc"[..], Some(10), &dest, &mut Progress::silent());
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_file_url_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pool/foo_1.0_all.deb");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"archive bytes").unwrap();

        let pkg = Package::parse_from_repository(
            "Package: foo\nVersion: 1.0\nArchitecture: all\nFilename: pool/foo_1.0_all.deb\n",
            &format!("file://{}", dir.path().display()),
        )
        .unwrap();

        let client = RepositoryClient::new().unwrap();
        let cache = dir.path().join("cache");
        let path = fetch_package(&client, &pkg, &cache, &mut Progress::silent()).unwrap();

        assert_eq!(path, cache.join("foo_1.0_all.deb"));
        assert_eq!(fs::read(&path).unwrap(), b"archive bytes");
        assert_eq!(
            client.fetch_bytes(&format!("file://{}", src.display())).unwrap(),
            b"archive bytes"
        );
    }

    #[test]
    fn test_fetch_package_never_writes_outside_cache() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pool/evil.deb");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"payload").unwrap();

        let pkg = Package::parse_from_repository(
            "Package: evil\nVersion: 1/../../escaped\nArchitecture: all\nFilename: pool/evil.deb\n",
            &format!("file://{}", dir.path().display()),
        )
        .unwrap();

        let client = RepositoryClient::new().unwrap();
        let cache = dir.path().join("root/apt/cache");
        let result = fetch_package(&client, &pkg, &cache, &mut Progress::silent());

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(!dir.path().join("root/escaped_all.deb").exists());
        assert!(!cache.exists());
    }

    #[test]
    fn test_fetch_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = RepositoryClient::new().unwrap();
        let result = client.fetch_to_file(
            &format!("file://{}/missing.deb", dir.path().display()),
            &dir.path().join("out.deb"),
            &mut Progress::silent(),
        );
        assert!(matches!(result, Err(Error::DownloadError(_))));
        assert!(!dir.path().join("out.deb").exists());
    }
}
