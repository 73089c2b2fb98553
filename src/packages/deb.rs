// src/packages/deb.rs

//! Debian binary archive reader
//!
//! A .deb is an AR archive holding `debian-binary`, a `control.tar.*` member
//! with the control stanza, and a `data.tar.*` member with the filesystem
//! payload. Both tar members are streamed straight out of the AR member; the
//! archive is reopened for each member so that the control data can be parsed
//! fully before the payload is touched, whatever the member order.

use crate::error::{Error, Result};
use crate::packages::control::Package;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;
use xz2::read::XzDecoder;

/// AR global header
const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

const CONTROL_MEMBER: &str = "control.tar";
const DATA_MEMBER: &str = "data.tar";

/// Compression applied to a tar member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Xz,
    Zstd,
    None,
}

impl Compression {
    /// Detect compression from an AR member name such as `data.tar.gz`
    pub fn from_member_name(name: &str) -> Result<Self> {
        if name.ends_with(".tar.gz") {
            Ok(Self::Gzip)
        } else if name.ends_with(".tar.xz") {
            Ok(Self::Xz)
        } else if name.ends_with(".tar.zst") {
            Ok(Self::Zstd)
        } else if name.ends_with(".tar") {
            Ok(Self::None)
        } else {
            Err(Error::ArchiveError(format!(
                "Unsupported archive member compression: {}",
                name
            )))
        }
    }

    /// Wrap a reader in the matching decoder
    fn decoder<'r, R: Read + 'r>(self, reader: R) -> Result<Box<dyn Read + 'r>> {
        Ok(match self {
            Self::Gzip => Box::new(GzDecoder::new(reader)),
            Self::Xz => Box::new(XzDecoder::new(reader)),
            Self::Zstd => Box::new(zstd::Decoder::new(reader).map_err(|e| {
                Error::ArchiveError(format!("Failed to create zstd decoder: {}", e))
            })?),
            Self::None => Box::new(reader),
        })
    }
}

/// Kind of a payload entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink(PathBuf),
    /// Devices, fifos, hard links: not materialized
    Unsupported(EntryType),
}

/// One entry of the data member, with its content stream
pub struct PayloadEntry<'a> {
    /// Path relative to the install root, already checked for `..`
    pub path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    /// Declared content length
    pub size: u64,
    pub data: &'a mut dyn Read,
}

/// A .deb archive on disk
#[derive(Debug, Clone)]
pub struct DebArchive {
    path: PathBuf,
}

impl DebArchive {
    /// Open an archive, checking the AR magic
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = File::open(&path).map_err(|e| {
            Error::ArchiveError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic).map_err(|e| {
            Error::ArchiveError(format!("Failed to read header of {}: {}", path.display(), e))
        })?;

        if &magic != AR_MAGIC {
            return Err(Error::ArchiveError(format!(
                "{} is not an AR archive",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw text of the `control` file from the control member
    pub fn control_text(&self) -> Result<String> {
        self.with_member(CONTROL_MEMBER, |reader| {
            let mut archive = Archive::new(reader);

            for entry in archive
                .entries()
                .map_err(|e| Error::ArchiveError(format!("Failed to read control.tar: {}", e)))?
            {
                let mut entry = entry
                    .map_err(|e| Error::ArchiveError(format!("Failed to read entry: {}", e)))?;

                let entry_path = entry
                    .path()
                    .map_err(|e| Error::ArchiveError(format!("Failed to get entry path: {}", e)))?
                    .into_owned();

                if sanitize_path(&entry_path)?.as_deref() == Some(Path::new("control")) {
                    let mut content = String::new();
                    entry.read_to_string(&mut content).map_err(|e| {
                        Error::ArchiveError(format!("Failed to read control file: {}", e))
                    })?;
                    return Ok(content);
                }
            }

            Err(Error::ArchiveError(
                "Could not find control file in control member".to_string(),
            ))
        })
    }

    /// Parsed control stanza
    pub fn control(&self) -> Result<Package> {
        let text = self.control_text()?;
        Package::parse(&text)
    }

    /// Stream every payload entry to `visit`, in archive order.
    ///
    /// The root entry (`./`) is skipped. Stops at the first error returned by
    /// the archive or by `visit`.
    pub fn for_each_payload_entry<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(PayloadEntry<'_>) -> Result<()>,
    {
        self.with_member(DATA_MEMBER, |reader| {
            let mut archive = Archive::new(reader);

            for entry in archive
                .entries()
                .map_err(|e| Error::ArchiveError(format!("Failed to read data.tar: {}", e)))?
            {
                let mut entry = entry
                    .map_err(|e| Error::ArchiveError(format!("Failed to read entry: {}", e)))?;

                let entry_path = entry
                    .path()
                    .map_err(|e| Error::ArchiveError(format!("Failed to get entry path: {}", e)))?
                    .into_owned();

                let Some(path) = sanitize_path(&entry_path)? else {
                    continue;
                };

                let entry_type = entry.header().entry_type();
                let mode = entry
                    .header()
                    .mode()
                    .map_err(|e| Error::ArchiveError(format!("Failed to get file mode: {}", e)))?;
                let size = entry.size();

                let kind = if entry_type.is_dir() {
                    EntryKind::Directory
                } else if entry_type.is_file() || entry_type == EntryType::Continuous {
                    EntryKind::File
                } else if entry_type.is_symlink() {
                    let target = entry
                        .link_name()
                        .map_err(|e| {
                            Error::ArchiveError(format!("Failed to get link target: {}", e))
                        })?
                        .ok_or_else(|| {
                            Error::ArchiveError(format!(
                                "Symlink {} has no target",
                                path.display()
                            ))
                        })?
                        .into_owned();
                    EntryKind::Symlink(target)
                } else {
                    EntryKind::Unsupported(entry_type)
                };

                visit(PayloadEntry {
                    path,
                    kind,
                    mode,
                    size,
                    data: &mut entry,
                })?;
            }

            Ok(())
        })
    }

    /// Locate the AR member whose name starts with `prefix` and hand its
    /// decompressed stream to `f`
    fn with_member<T, F>(&self, prefix: &str, f: F) -> Result<T>
    where
        F: for<'r> FnOnce(Box<dyn Read + 'r>) -> Result<T>,
    {
        let file = File::open(&self.path).map_err(|e| {
            Error::ArchiveError(format!("Failed to open {}: {}", self.path.display(), e))
        })?;

        let mut archive = ar::Archive::new(file);

        while let Some(entry) = archive.next_entry() {
            let entry =
                entry.map_err(|e| Error::ArchiveError(format!("Failed to read AR entry: {}", e)))?;

            let header = entry.header();
            // GNU ar terminates member names with '/'
            let name = String::from_utf8_lossy(header.identifier())
                .trim_end_matches('/')
                .to_string();

            debug!(
                "AR member {} ({} bytes, mode {:o}, uid {}, gid {}, mtime {})",
                name,
                header.size(),
                header.mode(),
                header.uid(),
                header.gid(),
                header.mtime()
            );

            if name.starts_with(prefix) {
                let compression = Compression::from_member_name(&name)?;
                let reader = compression.decoder(entry)?;
                return f(reader);
            }
        }

        Err(Error::ArchiveError(format!(
            "{} has no {}* member",
            self.path.display(),
            prefix
        )))
    }
}

/// Reduce an archive path to a plain relative path.
///
/// Returns `None` for the archive root. Absolute paths and `..` components are
/// rejected, as are names the one-path-per-line manifest cannot hold: non-UTF-8
/// bytes and line breaks.
pub fn sanitize_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut clean = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => match part.to_str() {
                Some(name) if !name.contains(['\n', '\r']) => clean.push(name),
                _ => {
                    return Err(Error::ArchiveError(format!(
                        "Unsupported file name in archive: {}",
                        path.display()
                    )));
                }
            },
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::ArchiveError(format!(
                    "Unsafe path in archive: {}",
                    path.display()
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(clean))
    }
}
