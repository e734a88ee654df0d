//! Semantic versions of platform releases.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors from version parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version {input:?}: {reason}")]
pub struct VersionError {
    pub input: String,
    pub reason: String,
}

/// An immutable (major, minor, patch, prerelease) version.
///
/// Parsing is tolerant: surrounding whitespace and a leading `v` are ignored
/// and a missing minor or patch component reads as `0`. Build metadata is
/// kept for display but ignored by equality and ordering.
#[derive(Clone)]
pub struct SemanticVersion(semver::Version);

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a release name such as `v11.3.0`, `12.0.0-alpha1` or `11.4`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let err = |reason: String| VersionError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(err("empty version".to_string()));
        }

        let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split);
        let components = core.split('.').count();
        if components > 3 {
            return Err(err("more than three numeric components".to_string()));
        }
        let padding = ".0".repeat(3 - components);
        let normalized = format!("{}{}{}", core, padding, suffix);

        semver::Version::parse(&normalized)
            .map(Self)
            .map_err(|e| err(e.to_string()))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Prerelease tag, `None` for a stable version.
    pub fn prerelease(&self) -> Option<&str> {
        if self.0.pre.is_empty() {
            None
        } else {
            Some(self.0.pre.as_str())
        }
    }

    /// Whether the prerelease tag contains `alpha`.
    pub fn is_alpha(&self) -> bool {
        self.0.pre.as_str().contains("alpha")
    }

    /// The (major, minor) release line.
    pub fn minor_line(&self) -> (u64, u64) {
        (self.0.major, self.0.minor)
    }

    /// Whether both versions sit on the same (major, minor) line.
    pub fn same_minor_line(&self, other: &Self) -> bool {
        self.minor_line() == other.minor_line()
    }

    /// Release record name for this version (`v` prefixed).
    pub fn release_name(&self) -> String {
        format!("v{}", self)
    }

    fn precedence_key(&self) -> (u64, u64, u64, &semver::Prerelease) {
        (self.0.major, self.0.minor, self.0.patch, &self.0.pre)
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_key() == other.precedence_key()
    }
}

impl Eq for SemanticVersion {}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_key().cmp(&other.precedence_key())
    }
}

impl std::hash::Hash for SemanticVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.precedence_key().hash(state);
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SemanticVersion({})", self.0)
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
