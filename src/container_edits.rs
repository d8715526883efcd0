//! Container edits
//!
//! Validation and application of [`ContainerEdits`]. Edits can come from a
//! single device, or from a whole spec. Device edits are applied to every
//! container the device is injected into. Spec edits are applied to every
//! container that receives at least one device of the spec.
//!
//! Applying edits is append-only: entries already present in the target
//! configuration are never removed or reordered, so applying the edits of
//! several devices one after the other simply concatenates them.

use std::fmt;
use std::str::FromStr;

use crate::error::{CdiError, Result};
use crate::oci;
use crate::specs::{ContainerEdits, DeviceNode, Hook, Mount};
use crate::validation::{validate_env, validate_hook_name};

/// Cgroup access granted to a device node without explicit permissions
pub const DEFAULT_DEVICE_ACCESS: &str = "rwm";

/// OCI lifecycle phases a hook can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    Prestart,
    CreateRuntime,
    CreateContainer,
    StartContainer,
    Poststart,
    Poststop,
}

impl HookName {
    /// Every recognized hook name
    pub const ALL: [HookName; 6] = [
        HookName::Prestart,
        HookName::CreateRuntime,
        HookName::CreateContainer,
        HookName::StartContainer,
        HookName::Poststart,
        HookName::Poststop,
    ];

    /// The name as it appears in spec files
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::Prestart => "prestart",
            HookName::CreateRuntime => "createRuntime",
            HookName::CreateContainer => "createContainer",
            HookName::StartContainer => "startContainer",
            HookName::Poststart => "poststart",
            HookName::Poststop => "poststop",
        }
    }

    fn phase_mut(self, hooks: &mut oci::Hooks) -> &mut Vec<oci::Hook> {
        match self {
            HookName::Prestart => &mut hooks.prestart,
            HookName::CreateRuntime => &mut hooks.create_runtime,
            HookName::CreateContainer => &mut hooks.create_container,
            HookName::StartContainer => &mut hooks.start_container,
            HookName::Poststart => &mut hooks.poststart,
            HookName::Poststop => &mut hooks.poststop,
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        HookName::ALL
            .into_iter()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| format!("unknown hook name {:?}", s))
    }
}

/// Apply optional edits to an optional runtime configuration.
///
/// Missing edits are a no-op. Edits against a missing configuration are an
/// error, since that always points at a caller bug.
pub fn apply_edits(edits: Option<&ContainerEdits>, spec: Option<&mut oci::RuntimeSpec>) -> Result<()> {
    match edits {
        None => Ok(()),
        Some(edits) => edits.apply(spec),
    }
}

impl ContainerEdits {
    /// True if the edits would not change anything
    pub fn is_empty(&self) -> bool {
        self.env.is_empty()
            && self.device_nodes.is_empty()
            && self.hooks.is_empty()
            && self.mounts.is_empty()
    }

    /// Validate the edits. `subject` names their owner in error messages.
    pub fn validate(&self, subject: &str) -> Result<()> {
        validate_env(subject, &self.env)?;
        for node in &self.device_nodes {
            node.validate(subject)?;
        }
        for hook in &self.hooks {
            hook.validate(subject)?;
        }
        for mount in &self.mounts {
            mount.validate(subject)?;
        }
        Ok(())
    }

    /// Append all entries of `other` after the entries of these edits
    pub fn append(&mut self, other: &ContainerEdits) -> &mut Self {
        self.env.extend(other.env.iter().cloned());
        self.device_nodes.extend(other.device_nodes.iter().cloned());
        self.hooks.extend(other.hooks.iter().cloned());
        self.mounts.extend(other.mounts.iter().cloned());
        self
    }

    /// Apply the edits to a runtime configuration.
    ///
    /// Environment entries are appended without deduplication. A consumer
    /// resolving the list front to back therefore sees the last entry for a
    /// repeated key win.
    pub fn apply(&self, spec: Option<&mut oci::RuntimeSpec>) -> Result<()> {
        let spec = spec.ok_or(CdiError::NilTarget)?;

        // resolved before touching the target: a bad name leaves it unchanged
        let hook_names = self
            .hooks
            .iter()
            .map(|hook| {
                hook.hook_name
                    .parse::<HookName>()
                    .map_err(|_| CdiError::UnsupportedHook {
                        subject: "container edits".to_string(),
                        hook: hook.hook_name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if !self.env.is_empty() {
            spec.process
                .get_or_insert_with(Default::default)
                .env
                .extend(self.env.iter().cloned());
        }

        for node in &self.device_nodes {
            let linux = spec.linux.get_or_insert_with(Default::default);
            linux.devices.push(node.to_oci());
            if let Some(rule) = node.to_cgroup_rule() {
                linux
                    .resources
                    .get_or_insert_with(Default::default)
                    .devices
                    .push(rule);
            }
        }

        spec.mounts.extend(self.mounts.iter().map(Mount::to_oci));

        for (name, hook) in hook_names.into_iter().zip(&self.hooks) {
            let hooks = spec.hooks.get_or_insert_with(Default::default);
            name.phase_mut(hooks).push(hook.to_oci());
        }

        Ok(())
    }
}

impl DeviceNode {
    /// Validate the device node
    pub fn validate(&self, subject: &str) -> Result<()> {
        if self.path.is_empty() {
            return Err(CdiError::invalid_edits(subject, "device node with empty path"));
        }
        if let Some(device_type) = &self.device_type {
            if !matches!(device_type.as_str(), "b" | "c" | "u" | "p") {
                return Err(CdiError::invalid_edits(
                    subject,
                    format!("device {:?}: invalid type {:?}", self.path, device_type),
                ));
            }
        }
        if let Some(permissions) = &self.permissions {
            if permissions.chars().any(|c| !matches!(c, 'r' | 'w' | 'm')) {
                return Err(CdiError::invalid_edits(
                    subject,
                    format!(
                        "device {:?}: invalid permissions {:?}",
                        self.path, permissions
                    ),
                ));
            }
        }
        Ok(())
    }

    fn to_oci(&self) -> oci::LinuxDevice {
        oci::LinuxDevice {
            path: self.path.clone(),
            device_type: self.device_type.clone().unwrap_or_default(),
            major: self.major.unwrap_or_default(),
            minor: self.minor.unwrap_or_default(),
            file_mode: self.file_mode,
            uid: self.uid,
            gid: self.gid,
        }
    }

    /// Block and character devices get a cgroup allow rule, with `rwm`
    /// access unless the node narrows it.
    fn to_cgroup_rule(&self) -> Option<oci::LinuxDeviceCgroup> {
        let device_type = self
            .device_type
            .as_deref()
            .filter(|t| matches!(*t, "b" | "c"))?;
        let access = match self.permissions.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_DEVICE_ACCESS,
        };
        Some(oci::LinuxDeviceCgroup {
            allow: true,
            device_type: Some(device_type.to_string()),
            major: self.major,
            minor: self.minor,
            access: Some(access.to_string()),
        })
    }
}

impl Hook {
    /// Validate the hook
    pub fn validate(&self, subject: &str) -> Result<()> {
        validate_hook_name(subject, &self.hook_name)?;
        if self.path.is_empty() {
            return Err(CdiError::invalid_edits(
                subject,
                format!("{} hook with empty path", self.hook_name),
            ));
        }
        validate_env(subject, &self.env)
    }

    fn to_oci(&self) -> oci::Hook {
        oci::Hook {
            path: self.path.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            timeout: self.timeout,
        }
    }
}

impl Mount {
    /// Validate the mount
    pub fn validate(&self, subject: &str) -> Result<()> {
        if self.host_path.is_empty() {
            return Err(CdiError::invalid_edits(subject, "mount with empty host path"));
        }
        if self.container_path.is_empty() {
            return Err(CdiError::invalid_edits(
                subject,
                "mount with empty container path",
            ));
        }
        Ok(())
    }

    fn to_oci(&self) -> oci::Mount {
        oci::Mount {
            destination: self.container_path.clone(),
            source: self.host_path.clone(),
            mount_type: self.mount_type.clone(),
            options: self.options.clone(),
            ..Default::default()
        }
    }
}
