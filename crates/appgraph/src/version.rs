//! Version and version range handling
//!
//! Application versions are semantic versions (`1.2.0`, `2.0.0-SNAPSHOT.41`).
//! Dependency ranges use npm-style syntax: space separated comparators
//! (`>=1.0.0 <2.0.0`), caret/tilde ranges and `||` alternatives.
//!
//! Interface versions are the shorter `major.minor[.patch]` form used by
//! module descriptors; a space separated list means "any of these".

use crate::error::{Error, Result};
use semver::{Version, VersionReq};
use std::fmt;

/// Parse an application or module version
pub fn parse_version(value: &str) -> Result<Version> {
    Version::parse(value.trim()).map_err(|source| Error::InvalidVersion {
        value: value.to_string(),
        source,
    })
}

/// A set of alternative version requirements (`a || b || c`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse an npm-style range
    ///
    /// An empty string, `*` or `latest` accepts every version.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for alternative in raw.split("||") {
            let normalized = normalize_comparators(alternative);
            let req = if normalized.is_empty() || normalized == "latest" {
                VersionReq::STAR
            } else {
                VersionReq::parse(&normalized).map_err(|source| Error::InvalidVersion {
                    value: raw.to_string(),
                    source,
                })?
            };
            alternatives.push(req);
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            alternatives,
        })
    }

    /// Check whether a version satisfies any alternative
    ///
    /// Pre-release builds (`1.1.0-SNAPSHOT.5`) are matched as their release
    /// version, so snapshot builds satisfy the range their release would.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| {
            req.matches(version)
                || (!version.pre.is_empty()
                    && req.matches(&Version::new(version.major, version.minor, version.patch)))
        })
    }

    /// Parse the version and check it against this range
    pub fn matches_str(&self, version: &str) -> Result<bool> {
        Ok(self.matches(&parse_version(version)?))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Turn `>= 1.0.0 <2.0.0` into `>=1.0.0, <2.0.0`
fn normalize_comparators(alternative: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in alternative.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op = Some(token);
            continue;
        }
        let token = token.trim_end_matches(',');
        match pending_op.take() {
            Some(op) => comparators.push(format!("{op}{token}")),
            None => comparators.push(token.to_string()),
        }
    }

    comparators.join(", ")
}

/// An interface version such as `1.2` or `3.0.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InterfaceVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl InterfaceVersion {
    /// Parse `major.minor[.patch]`
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("invalid interface version '{value}'"));
        let mut parts = value.trim().split('.');

        let mut next = |required: bool| -> Result<u64> {
            match parts.next() {
                Some(p) => p.parse::<u64>().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// Whether this provided version satisfies a required version
    ///
    /// Same major, and at least the required minor/patch.
    pub fn satisfies(&self, required: &InterfaceVersion) -> bool {
        self.major == required.major && (self.minor, self.patch) >= (required.minor, required.patch)
    }
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

/// Check a provided interface version against a required one
///
/// `required` may list several acceptable versions separated by spaces.
/// Unparseable versions never match.
pub fn interface_compatible(required: &str, provided: &str) -> bool {
    let Ok(provided) = InterfaceVersion::parse(provided) else {
        log::warn!("Ignoring malformed provided interface version '{provided}'");
        return false;
    };

    required
        .split_whitespace()
        .filter_map(|r| match InterfaceVersion::parse(r) {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("Ignoring malformed required interface version '{r}'");
                None
            }
        })
        .any(|r| provided.satisfies(&r))
}
