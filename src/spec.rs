//! CDI Spec files
//!
//! A [`Spec`] is a validated CDI document bound to the file it was loaded
//! from (or will be written to) and the priority its directory was given.
//!
//! ## Loading
//! [`read_spec`] reads and decodes a file. A missing file is not an error and
//! yields `Ok(None)`; a file without any document in it is.
//!
//! ## Writing
//! [`Spec::write`] encodes the document in the format its file extension
//! asks for, writes it to a temporary file next to the destination and
//! renames it into place. Readers never see a partially written spec.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::device::{Device, SpecOwner};
use crate::error::{CdiError, Result};
use crate::oci::RuntimeSpec;
use crate::parser::{parse_device, parse_qualifier, validate_class_name, validate_vendor_name};
use crate::specs::{ContainerEdits, RawSpec};
use crate::validation::validate_annotations;
use crate::validator::{run_validator, SpecValidator};
use crate::version::check_spec_version;

/// On-disk encoding of a spec file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecFormat {
    #[default]
    Yaml,
    Json,
}

impl SpecFormat {
    /// Pick the format matching a file extension, YAML unless it is `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }

    /// File extension for this format, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            SpecFormat::Yaml => "yaml",
            SpecFormat::Json => "json",
        }
    }
}

/// A validated CDI Spec
#[derive(Debug, Clone)]
pub struct Spec {
    raw: RawSpec,
    vendor: String,
    class: String,
    path: PathBuf,
    priority: i32,
    devices: Vec<Device>,
    index: HashMap<String, usize>,
}

impl Spec {
    /// Create a spec from a decoded document.
    ///
    /// The document is first handed to `validator`, then checked in full. A
    /// path without a `.yaml` or `.json` extension gets `.yaml` appended.
    pub fn new(
        raw: RawSpec,
        path: impl AsRef<Path>,
        priority: i32,
        validator: &dyn SpecValidator,
    ) -> Result<Self> {
        run_validator(validator, &raw)?;

        let path = normalize_path(path.as_ref());
        let (vendor, class) = parse_qualifier(&raw.kind);

        let mut spec = Self {
            raw,
            vendor,
            class,
            path,
            priority,
            devices: Vec::new(),
            index: HashMap::new(),
        };
        spec.validate()?;

        debug!(
            path = %spec.path.display(),
            priority = spec.priority,
            devices = spec.devices.len(),
            "loaded CDI Spec"
        );
        Ok(spec)
    }

    fn validate(&mut self) -> Result<()> {
        check_spec_version(&self.raw)?;
        validate_vendor_name(&self.vendor)?;
        validate_class_name(&self.class)?;
        validate_annotations(&self.raw.kind, &self.raw.annotations)?;
        self.raw.container_edits.validate(&self.raw.kind)?;

        let owner = SpecOwner {
            vendor: self.vendor.clone(),
            class: self.class.clone(),
            path: self.path.clone(),
        };

        let mut devices = Vec::with_capacity(self.raw.devices.len());
        let mut index = HashMap::with_capacity(self.raw.devices.len());
        for raw in &self.raw.devices {
            let device = Device::new(raw.clone(), owner.clone())?;
            if index.contains_key(device.name()) {
                return Err(CdiError::DuplicateDevice {
                    name: device.name().to_string(),
                });
            }
            index.insert(device.name().to_string(), devices.len());
            devices.push(device);
        }

        self.devices = devices;
        self.index = index;
        Ok(())
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// The `vendor/class` kind of this spec
    pub fn kind(&self) -> &str {
        &self.raw.kind
    }

    /// The declared `cdiVersion`
    pub fn version(&self) -> &str {
        &self.raw.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Encoding used when writing this spec back
    pub fn format(&self) -> SpecFormat {
        SpecFormat::from_path(&self.path)
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.raw.annotations
    }

    /// Spec-wide container edits, applied for any device of this spec
    pub fn edits(&self) -> &ContainerEdits {
        &self.raw.container_edits
    }

    /// Look up a device by its unqualified name
    pub fn get_device(&self, name: &str) -> Option<&Device> {
        self.index.get(name).map(|&i| &self.devices[i])
    }

    /// Devices in declaration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn raw(&self) -> &RawSpec {
        &self.raw
    }

    /// Whether this spec wins a naming conflict against `other`
    pub fn outranks(&self, other: &Spec) -> bool {
        self.priority > other.priority
    }

    /// Apply the spec-wide container edits to a runtime configuration
    pub fn apply_edits(&self, spec: &mut RuntimeSpec) -> Result<()> {
        self.edits().apply(Some(spec))
    }

    /// Inject devices of this spec into a runtime configuration.
    ///
    /// Device edits are applied in the order given, followed by the spec-wide
    /// edits. Names may be unqualified or qualified with this spec's kind. If
    /// any name does not resolve, `target` is left untouched. An empty
    /// selection applies nothing, not even the spec-wide edits.
    pub fn inject_devices<S: AsRef<str>>(&self, target: &mut RuntimeSpec, names: &[S]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut edits = ContainerEdits::default();
        for name in names {
            let name = name.as_ref();
            let device = self
                .resolve(name)
                .ok_or_else(|| CdiError::UnresolvedDevice {
                    name: name.to_string(),
                })?;
            edits.append(device.edits());
        }
        edits.append(self.edits());

        debug!(kind = %self.kind(), devices = names.len(), "injecting CDI devices");
        edits.apply(Some(target))
    }

    fn resolve(&self, name: &str) -> Option<&Device> {
        let (vendor, class, device) = parse_device(name);
        if !vendor.is_empty() && (vendor != self.vendor || class != self.class) {
            return None;
        }
        self.get_device(&device)
    }

    /// Write the spec to its path.
    ///
    /// `validator` is consulted first. Without `overwrite`, an existing file
    /// at the destination fails with [`CdiError::AlreadyExists`].
    pub fn write(&self, validator: &dyn SpecValidator, overwrite: bool) -> Result<()> {
        run_validator(validator, &self.raw)?;

        let data = self.encode()?;
        let write_err = |source| CdiError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        // dropped on error, which removes the temporary file
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&data).map_err(write_err)?;

        if overwrite {
            tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        } else {
            tmp.persist_noclobber(&self.path).map_err(|e| {
                if e.error.kind() == ErrorKind::AlreadyExists {
                    CdiError::AlreadyExists {
                        path: self.path.clone(),
                    }
                } else {
                    write_err(e.error)
                }
            })?;
        }

        info!(path = %self.path.display(), kind = %self.kind(), "wrote CDI Spec");
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let encode_err = |reason: String| CdiError::Encode {
            path: self.path.clone(),
            reason,
        };

        match self.format() {
            SpecFormat::Yaml => {
                let body = serde_yaml::to_string(&self.raw).map_err(|e| encode_err(e.to_string()))?;
                Ok(format!("---\n{}", body).into_bytes())
            }
            SpecFormat::Json => {
                serde_json::to_vec_pretty(&self.raw).map_err(|e| encode_err(e.to_string()))
            }
        }
    }
}

/// Decode a spec document from YAML or JSON.
///
/// Returns `Ok(None)` when the input holds no document at all.
pub fn parse_spec(data: &[u8]) -> Result<Option<RawSpec>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(serde_yaml::from_slice::<Option<RawSpec>>(data)?)
}

/// Read and validate the spec file at `path`.
///
/// A missing file yields `Ok(None)`.
pub fn read_spec(
    path: impl AsRef<Path>,
    priority: i32,
    validator: &dyn SpecValidator,
) -> Result<Option<Spec>> {
    let path = path.as_ref();
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no CDI Spec file");
            return Ok(None);
        }
        Err(source) => {
            return Err(CdiError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let raw = parse_spec(&data)?.ok_or_else(|| CdiError::NoSpecData {
        path: path.to_path_buf(),
    })?;

    Spec::new(raw, path, priority, validator).map(Some)
}

/// Validate a document and write it to `path` in one step
pub fn write_spec(
    raw: RawSpec,
    path: impl AsRef<Path>,
    validator: &dyn SpecValidator,
    overwrite: bool,
) -> Result<Spec> {
    let spec = Spec::new(raw, path, 0, validator)?;
    spec.write(validator, overwrite)?;
    Ok(spec)
}

/// File name (without extension) for a spec of the given vendor and class
pub fn generate_spec_name(vendor: &str, class: &str) -> String {
    format!("{}-{}", vendor, class)
}

fn normalize_path(path: &Path) -> PathBuf {
    let cleaned = clean_path(path);
    match cleaned.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("json") => cleaned,
        _ => {
            let mut name = OsString::from(cleaned);
            name.push(".yaml");
            PathBuf::from(name)
        }
    }
}

// lexical only, symlinks are not resolved
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{Hook, RawDevice};
    use crate::validator::NopValidator;

    const SPEC_YAML: &str = r#"
cdiVersion: "0.6.0"
kind: vendor.com/device
devices:
  - name: dev1
    containerEdits:
      env:
        - BAR=BARVALUE1
"#;

    fn env_device(name: &str, env: &str) -> RawDevice {
        RawDevice::new(
            name,
            ContainerEdits {
                env: vec![env.to_string()],
                ..Default::default()
            },
        )
    }

    fn raw_spec(devices: Vec<RawDevice>) -> RawSpec {
        let mut raw = RawSpec::new("vendor.com/device");
        raw.devices = devices;
        raw
    }

    #[test]
    fn test_parse_and_apply() {
        let raw = parse_spec(SPEC_YAML.as_bytes()).unwrap().unwrap();
        let spec = Spec::new(raw, "/etc/cdi/vendor.yaml", 0, &NopValidator).unwrap();

        assert_eq!(spec.vendor(), "vendor.com");
        assert_eq!(spec.class(), "device");
        assert_eq!(spec.version(), "0.6.0");
        assert_eq!(
            spec.get_device("dev1").unwrap().qualified_name(),
            "vendor.com/device=dev1"
        );

        let mut target = RuntimeSpec::default();
        spec.get_device("dev1").unwrap().apply_edits(&mut target).unwrap();
        spec.apply_edits(&mut target).unwrap();
        assert_eq!(target.process.unwrap().env, vec!["BAR=BARVALUE1"]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_spec(b"").unwrap().is_none());
        assert!(parse_spec(b"  \n\t").unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_input() {
        let err = parse_spec(b"cdiVersion: [unclosed").unwrap_err();
        assert!(matches!(err, CdiError::Decode(_)));
    }

    #[test]
    fn test_parse_json() {
        let raw = parse_spec(
            br#"{"cdiVersion":"0.3.0","kind":"vendor.com/device","devices":[{"name":"dev1","containerEdits":{"env":["A=1"]}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(raw.devices[0].container_edits.env, vec!["A=1"]);
    }

    #[test]
    fn test_empty_device_edits() {
        let raw = raw_spec(vec![RawDevice::new("dev1", ContainerEdits::default())]);
        let err = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap_err();
        match err {
            CdiError::EmptyEdits { device } => assert!(device.contains("dev1")),
            other => panic!("Expected EmptyEdits, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_device() {
        let raw = raw_spec(vec![
            env_device("dev1", "A=1"),
            env_device("dev1", "B=2"),
        ]);
        let err = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap_err();
        match err {
            CdiError::DuplicateDevice { name } => assert_eq!(name, "dev1"),
            other => panic!("Expected DuplicateDevice, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_hook() {
        let mut device = env_device("dev1", "A=1");
        device.container_edits.hooks.push(Hook {
            hook_name: "bogusHook".to_string(),
            path: "/bin/true".to_string(),
            ..Default::default()
        });
        let err = Spec::new(raw_spec(vec![device]), "vendor.yaml", 0, &NopValidator).unwrap_err();
        assert!(matches!(err, CdiError::UnsupportedHook { .. }));
    }

    #[test]
    fn test_invalid_kind() {
        let mut raw = raw_spec(vec![env_device("dev1", "A=1")]);
        raw.kind = "Vendor.com/device".to_string();
        let err = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap_err();
        assert!(matches!(err, CdiError::InvalidName { what: "vendor", .. }));

        let mut raw = raw_spec(vec![env_device("dev1", "A=1")]);
        raw.kind = "vendor.com".to_string();
        assert!(Spec::new(raw, "vendor.yaml", 0, &NopValidator).is_err());
    }

    #[test]
    fn test_version_too_low() {
        let mut raw = raw_spec(vec![env_device("dev1", "A=1")]);
        raw.version = "0.5.0".to_string();
        raw.annotations.insert("key".to_string(), "value".to_string());
        let err = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap_err();
        assert!(matches!(err, CdiError::VersionTooLow { .. }));
    }

    #[test]
    fn test_external_validator_runs_first() {
        let reject = |_: &RawSpec| -> anyhow::Result<()> { anyhow::bail!("rejected") };
        // would also fail with EmptyEdits
        let raw = raw_spec(vec![RawDevice::new("dev1", ContainerEdits::default())]);
        let err = Spec::new(raw, "vendor.yaml", 0, &reject).unwrap_err();
        assert!(matches!(err, CdiError::ExternalValidation(_)));
    }

    #[test]
    fn test_path_normalization() {
        let cases = [
            ("/etc/cdi/vendor.yaml", "/etc/cdi/vendor.yaml"),
            ("/etc/cdi/vendor.json", "/etc/cdi/vendor.json"),
            ("/etc/cdi/vendor", "/etc/cdi/vendor.yaml"),
            ("/etc/cdi/vendor.txt", "/etc/cdi/vendor.txt.yaml"),
            ("/etc/./cdi/../cdi//vendor.yaml", "/etc/cdi/vendor.yaml"),
            ("../cdi/vendor.json", "../cdi/vendor.json"),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_path(Path::new(input)), PathBuf::from(expected), "{}", input);
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SpecFormat::from_path(Path::new("a.json")), SpecFormat::Json);
        assert_eq!(SpecFormat::from_path(Path::new("a.yaml")), SpecFormat::Yaml);
        assert_eq!(SpecFormat::Json.extension(), "json");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let spec = read_spec(dir.path().join("absent.yaml"), 0, &NopValidator).unwrap();
        assert!(spec.is_none());
    }

    #[test]
    fn test_read_file_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "\n").unwrap();
        let err = read_spec(&path, 0, &NopValidator).unwrap_err();
        assert!(matches!(err, CdiError::NoSpecData { .. }));
    }

    #[test]
    fn test_write_yaml_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vendor.com-device");

        let spec = write_spec(
            raw_spec(vec![env_device("dev1", "A=1")]),
            &path,
            &NopValidator,
            true,
        )
        .unwrap();
        assert_eq!(spec.path(), dir.path().join("nested").join("vendor.com-device.yaml"));

        let content = fs::read_to_string(spec.path()).unwrap();
        assert!(content.starts_with("---\n"));

        let loaded = read_spec(spec.path(), 3, &NopValidator).unwrap().unwrap();
        assert_eq!(loaded.raw(), spec.raw());
        assert_eq!(loaded.priority(), 3);
        assert!(loaded.outranks(&spec));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let spec = write_spec(
            raw_spec(vec![env_device("dev1", "A=1")]),
            dir.path().join("vendor.json"),
            &NopValidator,
            true,
        )
        .unwrap();

        let content = fs::read_to_string(spec.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["kind"], "vendor.com/device");
    }

    #[test]
    fn test_write_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendor.yaml");
        fs::write(&path, "keep me").unwrap();

        let spec = Spec::new(
            raw_spec(vec![env_device("dev1", "A=1")]),
            &path,
            0,
            &NopValidator,
        )
        .unwrap();
        let err = spec.write(&NopValidator, false).unwrap_err();
        assert!(matches!(err, CdiError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
        // no temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        spec.write(&NopValidator, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("---\n"));
    }

    #[test]
    fn test_write_runs_validator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendor.yaml");
        let spec = Spec::new(
            raw_spec(vec![env_device("dev1", "A=1")]),
            &path,
            0,
            &NopValidator,
        )
        .unwrap();

        let reject = |_: &RawSpec| -> anyhow::Result<()> { anyhow::bail!("read-only vendor") };
        let err = spec.write(&reject, true).unwrap_err();
        assert!(matches!(err, CdiError::ExternalValidation(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_inject_devices() {
        let mut raw = raw_spec(vec![
            env_device("dev1", "A=1"),
            env_device("dev2", "B=2"),
        ]);
        raw.container_edits.env.push("SPEC=1".to_string());
        let spec = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap();

        let mut target = RuntimeSpec::default();
        spec.inject_devices(&mut target, &["vendor.com/device=dev2", "dev1"])
            .unwrap();
        assert_eq!(target.process.unwrap().env, vec!["B=2", "A=1", "SPEC=1"]);
    }

    #[test]
    fn test_inject_no_devices() {
        let mut raw = raw_spec(vec![env_device("dev1", "A=1")]);
        raw.container_edits.env.push("SPEC=1".to_string());
        let spec = Spec::new(raw, "vendor.yaml", 0, &NopValidator).unwrap();

        let mut target = RuntimeSpec::default();
        let none: [&str; 0] = [];
        spec.inject_devices(&mut target, &none).unwrap();
        assert_eq!(target, RuntimeSpec::default());
    }

    #[test]
    fn test_inject_unresolved_device() {
        let spec = Spec::new(
            raw_spec(vec![env_device("dev1", "A=1")]),
            "vendor.yaml",
            0,
            &NopValidator,
        )
        .unwrap();

        let mut target = RuntimeSpec::default();
        for name in ["dev2", "other.com/device=dev1"] {
            let err = spec.inject_devices(&mut target, &["dev1", name]).unwrap_err();
            assert!(matches!(err, CdiError::UnresolvedDevice { .. }), "{}", name);
        }
        assert_eq!(target, RuntimeSpec::default());
    }

    #[test]
    fn test_generate_spec_name() {
        assert_eq!(generate_spec_name("vendor.com", "device"), "vendor.com-device");
    }
}
