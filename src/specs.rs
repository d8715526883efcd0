//! Raw CDI Spec document types
//!
//! These mirror the on-disk YAML/JSON layout one to one. They carry no
//! guarantees of their own; a [`RawSpec`] only becomes a usable
//! [`Spec`](crate::Spec) after validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The most recent spec version this crate knows about
pub const CURRENT_VERSION: &str = "0.6.0";

/// A CDI Spec document as it appears on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSpec {
    #[serde(rename = "cdiVersion")]
    pub version: String,
    pub kind: String,
    /// Spec-scoped metadata. Does not affect the container.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub devices: Vec<RawDevice>,
    #[serde(
        rename = "containerEdits",
        default,
        skip_serializing_if = "ContainerEdits::is_empty"
    )]
    pub container_edits: ContainerEdits,
}

impl RawSpec {
    /// Create an empty document of the given kind at the current version
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            kind: kind.into(),
            annotations: BTreeMap::new(),
            devices: Vec::new(),
            container_edits: ContainerEdits::default(),
        }
    }
}

/// A single device entry of a spec document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDevice {
    pub name: String,
    /// Device-scoped metadata. Does not affect the container.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "containerEdits", default)]
    pub container_edits: ContainerEdits,
}

impl RawDevice {
    /// Create a device entry with the given edits
    pub fn new(name: impl Into<String>, container_edits: ContainerEdits) -> Self {
        Self {
            name: name.into(),
            annotations: BTreeMap::new(),
            container_edits,
        }
    }
}

/// Edits a container runtime must make to the OCI spec to expose a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(rename = "deviceNodes", default, skip_serializing_if = "Vec::is_empty")]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

/// A device node to create in the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    /// Path of the node inside the container
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// `b`, `c`, `u` or `p`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Cgroup access string made of `r`, `w` and `m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl DeviceNode {
    /// Create a device node with only its container path set
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// A mount to add to the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
}

/// A lifecycle hook to add to the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    /// One of the OCI hook phases, see [`HookName`](crate::HookName)
    pub hook_name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
}
