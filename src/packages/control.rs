// src/packages/control.rs

//! Control stanza parsing and the `Package` metadata record
//!
//! A stanza is a block of `Key: Value` lines. Lines starting with a space or a
//! tab continue the value of the previous key. Stanzas are separated by blank
//! lines, both in the persisted catalog and in a repository `Packages` index.
//!
//! Fields are kept as a generic map so that unknown fields survive a
//! parse/serialize cycle; typed accessors sit on top of the map and validate
//! required fields only when they are asked for.

use crate::error::{Error, Result};
use crate::version::Version;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

pub const FIELD_PACKAGE: &str = "Package";
pub const FIELD_VERSION: &str = "Version";
pub const FIELD_ARCHITECTURE: &str = "Architecture";
pub const FIELD_SECTION: &str = "Section";
pub const FIELD_DEPENDS: &str = "Depends";
pub const FIELD_REPOSITORY: &str = "Repository";
pub const FIELD_FILENAME: &str = "Filename";

/// Package metadata parsed from a control stanza
///
/// Immutable once parsed: catalog refreshes and installs replace packages
/// wholesale instead of editing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    name: String,
    fields: BTreeMap<String, String>,
}

impl Package {
    /// Parse a single stanza into a package.
    ///
    /// Fails with `MalformedStanza` when the text holds no field lines at all
    /// and with `MissingField` when there is no `Package` field, since such a
    /// record cannot be keyed by name.
    pub fn parse(stanza: &str) -> Result<Self> {
        let fields = parse_fields(stanza)?;
        Self::from_fields(fields)
    }

    /// Parse a stanza and tag it with the repository it was published by
    pub fn parse_from_repository(stanza: &str, repository: &str) -> Result<Self> {
        let mut fields = parse_fields(stanza)?;
        fields.insert(
            FIELD_REPOSITORY.to_string(),
            repository.trim_end_matches('/').to_string(),
        );
        Self::from_fields(fields)
    }

    /// Build a package from an already split field map.
    ///
    /// Every field must read back unchanged once written as a stanza. Keys
    /// are non-empty and hold no `:` or line break. A value's first line has
    /// no surrounding whitespace and no later line is blank.
    pub fn from_fields(fields: BTreeMap<String, String>) -> Result<Self> {
        for (key, value) in &fields {
            validate_field(key, value)?;
        }

        let name = fields
            .get(FIELD_PACKAGE)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::MissingField {
                package: "<unnamed>".to_string(),
                field: FIELD_PACKAGE,
            })?;

        Ok(Self { name, fields })
    }

    /// Parse a blank-line separated list of stanzas.
    ///
    /// Records that do not form a valid package are logged and dropped; the
    /// rest of the list is still returned. When `repository` is given, every
    /// package is tagged with it.
    pub fn parse_many(text: &str, repository: Option<&str>) -> Vec<Self> {
        let mut packages = Vec::new();

        for stanza in split_stanzas(text) {
            let parsed = match repository {
                Some(repo) => Self::parse_from_repository(&stanza, repo),
                None => Self::parse(&stanza),
            };

            match parsed {
                Ok(pkg) => packages.push(pkg),
                Err(e) => warn!("Dropping invalid stanza: {}", e),
            }
        }

        packages
    }

    /// Raw field lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// All fields, sorted by key
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed version; a missing `Version` field orders as the empty version
    pub fn version(&self) -> Version {
        Version::parse(self.get(FIELD_VERSION).unwrap_or_default())
    }

    pub fn architecture(&self) -> Option<&str> {
        self.get(FIELD_ARCHITECTURE)
    }

    pub fn section(&self) -> Option<&str> {
        self.get(FIELD_SECTION)
    }

    pub fn repository(&self) -> Option<&str> {
        self.get(FIELD_REPOSITORY)
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(FIELD_FILENAME)
    }

    /// Names listed in `Depends`.
    ///
    /// The list is split on single spaces with no cleanup, so a doubled
    /// space yields an empty name which will not resolve.
    pub fn dependency_names(&self) -> Vec<&str> {
        match self.get(FIELD_DEPENDS) {
            Some(deps) => deps.split(' ').collect(),
            None => Vec::new(),
        }
    }

    /// Local archive name: `<name>_<version>_<architecture>.deb`
    ///
    /// The result is always a single path component; field values that would
    /// make it a path are rejected.
    pub fn archive_filename(&self) -> Result<String> {
        let version = self.require(FIELD_VERSION)?;
        let arch = self.require(FIELD_ARCHITECTURE)?;
        let filename = format!("{}_{}_{}.deb", self.name, version, arch);
        if filename.contains(['/', '\\', '\0']) {
            return Err(Error::ParseError(format!(
                "Invalid archive filename for {}: {:?}",
                self.name, filename
            )));
        }
        Ok(filename)
    }

    /// Download location: repository base URL joined with `Filename`
    pub fn source_uri(&self) -> Result<String> {
        let repository = self.require(FIELD_REPOSITORY)?;
        let filename = self.require(FIELD_FILENAME)?;
        Ok(format!(
            "{}/{}",
            repository.trim_end_matches('/'),
            filename.trim_start_matches('/')
        ))
    }

    fn require(&self, field: &'static str) -> Result<&str> {
        self.get(field).ok_or_else(|| Error::MissingField {
            package: self.name.clone(),
            field,
        })
    }
}

impl fmt::Display for Package {
    /// Serialize back to stanza form, `Package` first.
    ///
    /// Multi-line values are written as continuation lines. No trailing blank
    /// line is emitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ordered = self
            .fields
            .get_key_value(FIELD_PACKAGE)
            .into_iter()
            .chain(self.fields.iter().filter(|(k, _)| *k != FIELD_PACKAGE));

        for (key, value) in ordered {
            let mut lines = value.split('\n');
            writeln!(f, "{}: {}", key, lines.next().unwrap_or_default())?;
            for line in lines {
                writeln!(f, " {}", line)?;
            }
        }
        Ok(())
    }
}

/// Split text into stanzas on blank lines
pub fn split_stanzas(text: &str) -> Vec<String> {
    let mut stanzas = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }

    if !current.is_empty() {
        stanzas.push(current);
    }

    stanzas
}

fn validate_field(key: &str, value: &str) -> Result<()> {
    if key.is_empty() || key != key.trim() || key.contains([':', '\n']) {
        return Err(Error::MalformedStanza(format!("invalid field name {:?}", key)));
    }

    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or_default();
    if first != first.trim() || lines.any(|line| line.trim().is_empty()) {
        return Err(Error::MalformedStanza(format!(
            "value of {} cannot be written as a stanza: {:?}",
            key, value
        )));
    }
    Ok(())
}

/// Split one stanza into its fields
fn parse_fields(stanza: &str) -> Result<BTreeMap<String, String>> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in stanza.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation of the previous key
            if let Some(value) = current.as_ref().and_then(|key| fields.get_mut(key)) {
                value.push('\n');
                value.push_str(&line[1..]);
            }
        } else if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            if key.is_empty() {
                current = None;
                continue;
            }
            fields.insert(key.clone(), value.trim().to_string());
            current = Some(key);
        }
    }

    if fields.is_empty() {
        return Err(Error::MalformedStanza(format!(
            "no field lines in {:?}",
            stanza.lines().next().unwrap_or_default()
        )));
    }

    Ok(fields)
}
