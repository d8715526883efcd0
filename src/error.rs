//! Error types for CDI spec handling

use std::path::PathBuf;

use thiserror::Error;

/// Result type for CDI spec operations
pub type Result<T> = std::result::Result<T, CdiError>;

/// CDI spec errors
#[derive(Error, Debug)]
pub enum CdiError {
    #[error("failed to read CDI Spec {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to unmarshal CDI Spec: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("failed to read CDI Spec {path:?}: no Spec data")]
    NoSpecData { path: PathBuf },

    #[error("invalid version {0:?}")]
    UnsupportedVersion(String),

    #[error("the spec version must be at least v{required}, got v{declared}")]
    VersionTooLow { declared: String, required: String },

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("invalid {what} {name:?}: {reason}")]
    InvalidName {
        what: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid {subject} annotations: {reason}")]
    InvalidAnnotations { subject: String, reason: String },

    #[error("invalid spec, multiple device {name:?}")]
    DuplicateDevice { name: String },

    #[error("invalid device {device:?}, empty device edits")]
    EmptyEdits { device: String },

    #[error("invalid {subject} edits: invalid hook {hook:?}")]
    UnsupportedHook { subject: String, hook: String },

    #[error("invalid {subject} edits: {reason}")]
    InvalidEdits { subject: String, reason: String },

    #[error("Spec validation failed: {0:#}")]
    ExternalValidation(anyhow::Error),

    #[error("failed to load JSON schema {source_name}: {reason}")]
    Schema { source_name: String, reason: String },

    #[error("failed to write Spec file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to marshal Spec file {path:?}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("failed to write Spec file {path:?}: file already exists")]
    AlreadyExists { path: PathBuf },

    #[error("unresolvable CDI device {name:?}")]
    UnresolvedDevice { name: String },

    #[error("can't edit nil OCI Spec")]
    NilTarget,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CdiError {
    pub(crate) fn invalid_name(
        what: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CdiError::InvalidName {
            what,
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_edits(subject: &str, reason: impl Into<String>) -> Self {
        CdiError::InvalidEdits {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }
}
