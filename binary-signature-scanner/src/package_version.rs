// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version strings.

Versioned package relationships (`libc6 (>= 2.34)`) need version parsing and
ordering. The format is `[epoch:]upstream_version[-debian_revision]` and the
ordering rules are those implemented by `dpkg`.
*/

use {
    crate::error::{Result, ScanError},
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// A parsed Debian package version.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Parse a version string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(ScanError::Version("empty version string".into()));
        }

        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => {
                if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ScanError::Version(format!("epoch is not numeric: {}", s)));
                }

                let epoch = u32::from_str(epoch)
                    .map_err(|e| ScanError::Version(format!("{}: {}", s, e)))?;

                (Some(epoch), remainder)
            }
            None => (None, s),
        };

        // The revision is everything after the last hyphen.
        let (upstream, revision) = match remainder.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, Some(revision)),
            None => (remainder, None),
        };

        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ScanError::Version(format!(
                "upstream version must start with a digit: {}",
                s
            )));
        }

        if !upstream.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '.' | '+' | '~')
                || (c == '-' && revision.is_some())
                || (c == ':' && epoch.is_some())
        }) {
            return Err(ScanError::Version(format!(
                "upstream version has illegal character: {}",
                s
            )));
        }

        if let Some(revision) = revision {
            if revision.is_empty()
                || !revision
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~'))
            {
                return Err(ScanError::Version(format!(
                    "debian revision has illegal character: {}",
                    s
                )));
            }
        }

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision: revision.map(|x| x.to_string()),
        })
    }

    /// The explicit epoch, if any.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The epoch, defaulting to `0`.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }
}

impl FromStr for PackageVersion {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        f.write_str(&self.upstream_version)?;

        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}

/// Weight of a non-digit character in a version component.
///
/// Tilde sorts before everything including the end of the string. Letters
/// sort before all other non-digits.
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(b'~') => -1,
        Some(c) => c as i32 + 256,
    }
}

/// Compare a single version component (upstream version or revision).
fn compare_component(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // Non-digit prefix, compared character by character.
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = char_order(a.get(i).copied());
            let bc = char_order(b.get(j).copied());

            if ac != bc {
                return ac.cmp(&bc);
            }

            i += 1;
            j += 1;
        }

        // Digit run, compared numerically without overflowing on long runs.
        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_difference = Ordering::Equal;

        while i < a.len() && j < b.len() && a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            if first_difference == Ordering::Equal {
                first_difference = a[i].cmp(&b[j]);
            }

            i += 1;
            j += 1;
        }

        if a.get(i).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            return Ordering::Greater;
        }
        if b.get(j).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            return Ordering::Less;
        }
        if first_difference != Ordering::Equal {
            return first_difference;
        }
    }

    Ordering::Equal
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_component(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                // A missing revision is equivalent to `0`.
                compare_component(
                    self.debian_revision.as_deref().unwrap_or("0"),
                    other.debian_revision.as_deref().unwrap_or("0"),
                )
            })
    }
}
