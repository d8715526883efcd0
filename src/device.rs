//! CDI devices
//!
//! A [`Device`] is one injectable entry of a [`Spec`](crate::Spec). Devices are
//! only created while their spec is validated and live inside it, so every
//! device has a fully qualified name. Instead of pointing back at the spec, a
//! device records the identity of its owner (vendor, class and spec path).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CdiError, Result};
use crate::oci::RuntimeSpec;
use crate::parser::{qualified_name, validate_device_name};
use crate::specs::{ContainerEdits, RawDevice};
use crate::validation::validate_annotations;

/// Identity of the spec owning a device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecOwner {
    pub vendor: String,
    pub class: String,
    pub path: PathBuf,
}

impl SpecOwner {
    /// The `vendor/class` kind of the owning spec
    pub fn kind(&self) -> String {
        format!("{}/{}", self.vendor, self.class)
    }
}

/// A validated device of a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    raw: RawDevice,
    owner: SpecOwner,
}

impl Device {
    /// Create and validate a device of the spec identified by `owner`.
    ///
    /// Only called while the owning spec is validated.
    pub(crate) fn new(raw: RawDevice, owner: SpecOwner) -> Result<Self> {
        let device = Self { raw, owner };
        device.validate()?;
        Ok(device)
    }

    /// The unqualified device name
    pub fn name(&self) -> &str {
        &self.raw.name
    }

    /// The fully qualified `vendor/class=name`
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.owner.vendor, &self.owner.class, &self.raw.name)
    }

    /// The spec this device belongs to
    pub fn owner(&self) -> &SpecOwner {
        &self.owner
    }

    /// Path of the spec this device belongs to
    pub fn spec_path(&self) -> &Path {
        &self.owner.path
    }

    /// Device-scoped annotations
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.raw.annotations
    }

    /// The device specific container edits
    pub fn edits(&self) -> &ContainerEdits {
        &self.raw.container_edits
    }

    /// The raw device entry
    pub fn raw(&self) -> &RawDevice {
        &self.raw
    }

    /// Apply the device specific container edits to a runtime configuration
    pub fn apply_edits(&self, spec: &mut RuntimeSpec) -> Result<()> {
        self.edits().apply(Some(spec))
    }

    fn validate(&self) -> Result<()> {
        validate_device_name(&self.raw.name)?;

        let subject = self.qualified_name();
        validate_annotations(&subject, &self.raw.annotations)?;

        let edits = self.edits();
        if edits.is_empty() {
            return Err(CdiError::EmptyEdits { device: subject });
        }
        edits.validate(&subject)
    }
}
