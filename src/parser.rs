//! Qualified device names
//!
//! A CDI device is requested by its fully qualified name:
//!
//! ```text
//! vendor.com/class=device
//! ```
//!
//! The `vendor/class` part doubles as the `kind` of a spec. Vendor and class
//! follow a lowercase DNS-subdomain-like grammar, device names a DNS-label-like
//! one. Both grammars are plain regular expressions.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CdiError, Result};

/// Longest accepted vendor or class name
pub const MAX_QUALIFIER_LENGTH: usize = 253;

/// Longest accepted device name
pub const MAX_DEVICE_NAME_LENGTH: usize = 63;

/// A parsed `vendor/class=name` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub vendor: String,
    pub class: String,
    pub name: String,
}

impl QualifiedName {
    /// Create a qualified name, validating all three parts
    pub fn new(
        vendor: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let qualified = Self {
            vendor: vendor.into(),
            class: class.into(),
            name: name.into(),
        };
        validate_vendor_name(&qualified.vendor)?;
        validate_class_name(&qualified.class)?;
        validate_device_name(&qualified.name)?;
        Ok(qualified)
    }

    /// Parse and validate a `vendor/class=name` string
    pub fn parse(device: &str) -> Result<Self> {
        let (vendor, class, name) = parse_device(device);

        if vendor.is_empty() {
            return Err(CdiError::invalid_name(
                "qualified device name",
                device,
                "unqualified device, missing vendor",
            ));
        }

        Self::new(vendor, class, name)
    }

    /// The `vendor/class` part of the name
    pub fn kind(&self) -> String {
        format!("{}/{}", self.vendor, self.class)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}={}", self.vendor, self.class, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = CdiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Format a qualified device name. The parts are not validated.
pub fn qualified_name(vendor: &str, class: &str, name: &str) -> String {
    format!("{}/{}={}", vendor, class, name)
}

/// Check whether a device name is a valid qualified name
pub fn is_qualified_name(device: &str) -> bool {
    QualifiedName::parse(device).is_ok()
}

/// Split a device name into vendor, class and name without validating.
///
/// Unqualified names come back with empty vendor and class.
pub fn parse_device(device: &str) -> (String, String, String) {
    if device.is_empty() || device.starts_with('=') {
        return (String::new(), String::new(), device.to_string());
    }

    match device.split_once('=') {
        Some((kind, name)) => {
            let (vendor, class) = parse_qualifier(kind);
            if vendor.is_empty() {
                return (String::new(), String::new(), device.to_string());
            }
            (vendor, class, name.to_string())
        }
        None => (String::new(), String::new(), device.to_string()),
    }
}

/// Split a `vendor/class` kind into its parts.
///
/// A kind without `/` yields two empty strings.
pub fn parse_qualifier(kind: &str) -> (String, String) {
    match kind.split_once('/') {
        Some((vendor, class)) => (vendor.to_string(), class.to_string()),
        None => (String::new(), String::new()),
    }
}

static QUALIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]([a-z0-9._-]*[a-z0-9])?$").expect("qualifier regex"));

static DEVICE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("device name regex")
});

/// Validate a vendor name
pub fn validate_vendor_name(vendor: &str) -> Result<()> {
    validate_qualifier("vendor", vendor)
}

/// Validate a device class name
pub fn validate_class_name(class: &str) -> Result<()> {
    validate_qualifier("class", class)
}

/// Validate an unqualified device name.
///
/// Alphanumerics plus `-`, `_` and `.`, starting and ending with an
/// alphanumeric, at most 63 characters.
pub fn validate_device_name(name: &str) -> Result<()> {
    const WHAT: &str = "device name";

    if name.is_empty() {
        return Err(CdiError::invalid_name(WHAT, name, "empty name"));
    }
    if name.len() > MAX_DEVICE_NAME_LENGTH {
        return Err(CdiError::invalid_name(
            WHAT,
            name,
            format!("longer than {} characters", MAX_DEVICE_NAME_LENGTH),
        ));
    }
    if !DEVICE_NAME_RE.is_match(name) {
        return Err(CdiError::invalid_name(
            WHAT,
            name,
            "should consist of alphanumerics, '-', '_' or '.', and start and end with an alphanumeric",
        ));
    }
    Ok(())
}

fn validate_qualifier(what: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CdiError::invalid_name(what, value, "empty name"));
    }
    if value.len() > MAX_QUALIFIER_LENGTH {
        return Err(CdiError::invalid_name(
            what,
            value,
            format!("longer than {} characters", MAX_QUALIFIER_LENGTH),
        ));
    }
    if !QUALIFIER_RE.is_match(value) {
        return Err(CdiError::invalid_name(
            what,
            value,
            "should consist of lowercase alphanumerics, '-', '_' or '.', start with a letter and end with a letter or digit",
        ));
    }
    Ok(())
}
