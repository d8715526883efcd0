//! Spec versioning
//!
//! Every spec declares a `cdiVersion`. The declared version must be one this
//! crate knows, and it must be at least the version that introduced every
//! feature the document actually uses.

use std::fmt;

use semver::Version;

use crate::error::{CdiError, Result};
use crate::parser::parse_qualifier;
use crate::specs::RawSpec;

/// A spec version (e.g., "0.6.0")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecVersion {
    pub version: Version,
}

/// Known spec versions, each with the check telling whether a document needs
/// at least that version. Ordered newest first.
const REQUIREMENTS: &[((u64, u64, u64), fn(&RawSpec) -> bool)] = &[
    ((0, 6, 0), requires_v060),
    ((0, 5, 0), requires_v050),
    ((0, 4, 0), requires_v040),
    ((0, 3, 0), requires_v030),
];

impl SpecVersion {
    /// Create from a version string, tolerating a leading 'v'
    pub fn parse(version_str: &str) -> Result<Self> {
        let version_str = version_str.strip_prefix('v').unwrap_or(version_str);
        let version = Version::parse(version_str)?;
        Ok(Self { version })
    }

    /// Get the version string (e.g., "0.6.0")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Check if this version is strictly newer than another
    pub fn is_greater_than(&self, other: &SpecVersion) -> bool {
        self > other
    }

    /// Check if this is one of the known spec versions
    pub fn is_known(&self) -> bool {
        known_versions().any(|known| known == *self)
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

fn known_versions() -> impl Iterator<Item = SpecVersion> {
    REQUIREMENTS.iter().map(|(v, _)| known(*v))
}

fn known((major, minor, patch): (u64, u64, u64)) -> SpecVersion {
    SpecVersion {
        version: Version::new(major, minor, patch),
    }
}

/// Check that a declared version is one of the known spec versions
pub fn validate_version(version: &str) -> Result<SpecVersion> {
    match SpecVersion::parse(version) {
        Ok(parsed) if parsed.is_known() => Ok(parsed),
        _ => Err(CdiError::UnsupportedVersion(version.to_string())),
    }
}

/// Determine the lowest spec version able to express everything in `spec`
pub fn minimum_required_version(spec: &RawSpec) -> SpecVersion {
    REQUIREMENTS
        .iter()
        .find(|(_, required)| required(spec))
        .map(|(v, _)| known(*v))
        .unwrap_or_else(|| known((0, 3, 0)))
}

/// Check the declared version of `spec` against the features it uses
pub fn check_spec_version(spec: &RawSpec) -> Result<SpecVersion> {
    let declared = validate_version(&spec.version)?;
    let required = minimum_required_version(spec);
    if required.is_greater_than(&declared) {
        return Err(CdiError::VersionTooLow {
            declared: declared.version_string(),
            required: required.version_string(),
        });
    }
    Ok(declared)
}

// annotations and dots in the class name arrived in 0.6.0
fn requires_v060(spec: &RawSpec) -> bool {
    if !spec.annotations.is_empty() {
        return true;
    }
    if spec.devices.iter().any(|d| !d.annotations.is_empty()) {
        return true;
    }
    let (_, class) = parse_qualifier(&spec.kind);
    class.contains('.')
}

// device names starting with a digit and device node host paths arrived in 0.5.0
fn requires_v050(spec: &RawSpec) -> bool {
    let digit_first = spec
        .devices
        .iter()
        .any(|d| !d.name.is_empty() && !d.name.starts_with(|c: char| c.is_ascii_alphabetic()));
    if digit_first {
        return true;
    }

    std::iter::once(&spec.container_edits)
        .chain(spec.devices.iter().map(|d| &d.container_edits))
        .flat_map(|edits| &edits.device_nodes)
        .any(|node| node.host_path.as_deref().is_some_and(|p| !p.is_empty()))
}

// mount types arrived in 0.4.0
fn requires_v040(spec: &RawSpec) -> bool {
    std::iter::once(&spec.container_edits)
        .chain(spec.devices.iter().map(|d| &d.container_edits))
        .flat_map(|edits| &edits.mounts)
        .any(|mount| mount.mount_type.as_deref().is_some_and(|t| !t.is_empty()))
}

fn requires_v030(_: &RawSpec) -> bool {
    true
}
