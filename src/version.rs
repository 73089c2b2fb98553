// src/version.rs

//! Debian-style version parsing and ordering
//!
//! A version string has the shape `[epoch:]upstream[-revision]`. Parsing never
//! fails: a malformed epoch counts as zero and every other part is compared
//! with the dpkg alternating-run rule, so any catalog data can be ordered.

use std::cmp::Ordering;
use std::fmt;

/// Parsed package version
///
/// Equality follows the ordering, so `1.0` and `1.00` (or `0:1.0` and `1.0`)
/// are equal even though their text differs.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    epoch: u64,
    upstream: String,
    revision: String,
}

impl Version {
    /// Parse a version string. Accepts any input.
    pub fn parse(s: &str) -> Self {
        let raw = s.trim().to_string();

        let (epoch, rest) = match raw.split_once(':') {
            Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
            None => (0, raw.as_str()),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, revision),
            None => (rest, ""),
        };

        Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.to_string(),
            raw,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The version text as it appeared in the control data
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Weight of a single character in a non-digit run.
///
/// `~` sorts before the end of the run, which sorts before letters, which
/// sort before every other character.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(b'~') => -1,
        Some(c) => c as i32 + 256,
    }
}

/// Compare two version fragments with the dpkg alternating-run rule
fn compare_fragment(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    let digit_at = |s: &[u8], k: usize| s.get(k).is_some_and(|c| c.is_ascii_digit());

    while i < a.len() || j < b.len() {
        // Non-digit run, character by character
        while (i < a.len() && !digit_at(a, i)) || (j < b.len() && !digit_at(b, j)) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        // Digit run, numerically without overflow
        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while digit_at(a, i) && digit_at(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        if digit_at(a, i) {
            return Ordering::Greater;
        }
        if digit_at(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_fragment(&self.upstream, &other.upstream))
            .then_with(|| compare_fragment(&self.revision, &other.revision))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
