//! Validation rules
//!
//! Stateless checks shared by specs, devices and edit sets. Each rule returns
//! a descriptive [`CdiError`] naming the offending subject instead of a bare
//! boolean.
//!
//! ## Rules
//! 1. **Names**: vendor, class and device grammar (see [`crate::parser`])
//! 2. **Annotations**: Kubernetes-style qualified keys, 256 KiB total size
//! 3. **Environment**: `KEY=VALUE` entries with a non-empty key
//! 4. **Hooks**: names from the closed set of OCI lifecycle phases

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::container_edits::HookName;
use crate::error::{CdiError, Result};

pub use crate::parser::{validate_class_name, validate_device_name, validate_vendor_name};

/// Upper bound for the cumulative size of all keys and values of one subject
pub const TOTAL_ANNOTATION_SIZE_LIMIT: usize = 256 * 1024;

const QUALIFIED_NAME_MAX_LENGTH: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

static QUALIFIED_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("qualified name regex")
});

static DNS1123_SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("dns subdomain regex")
});

/// Validate the annotations of a spec or device.
///
/// `subject` names the owner in error messages, typically the spec kind or the
/// qualified device name. Key errors are collected and reported together.
pub fn validate_annotations(subject: &str, annotations: &BTreeMap<String, String>) -> Result<()> {
    let mut problems = Vec::new();

    for key in annotations.keys() {
        // case does not matter for annotation keys
        if let Err(reason) = check_qualified_key(&key.to_lowercase()) {
            problems.push(format!("{:?} is invalid: {}", key, reason));
        }
    }

    let size: usize = annotations.iter().map(|(k, v)| k.len() + v.len()).sum();
    if size > TOTAL_ANNOTATION_SIZE_LIMIT {
        problems.push(format!(
            "total size {} is larger than limit {}",
            size, TOTAL_ANNOTATION_SIZE_LIMIT
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CdiError::InvalidAnnotations {
            subject: subject.to_string(),
            reason: problems.join("; "),
        })
    }
}

fn check_qualified_key(key: &str) -> std::result::Result<(), String> {
    let (prefix, name) = match key.split('/').collect::<Vec<_>>().as_slice() {
        [name] => (None, *name),
        [prefix, name] => (Some(*prefix), *name),
        _ => return Err("a qualified name may contain at most one '/'".to_string()),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() {
            return Err("prefix part must be non-empty".to_string());
        }
        if prefix.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
            return Err(format!(
                "prefix part must be no more than {} characters",
                DNS1123_SUBDOMAIN_MAX_LENGTH
            ));
        }
        if !DNS1123_SUBDOMAIN_RE.is_match(prefix) {
            return Err("prefix part must be a lowercase DNS subdomain".to_string());
        }
    }

    if name.is_empty() {
        return Err("name part must be non-empty".to_string());
    }
    if name.len() > QUALIFIED_NAME_MAX_LENGTH {
        return Err(format!(
            "name part must be no more than {} characters",
            QUALIFIED_NAME_MAX_LENGTH
        ));
    }
    if !QUALIFIED_NAME_RE.is_match(name) {
        return Err(
            "name part must consist of alphanumerics, '-', '_' or '.', and must start and end with an alphanumeric"
                .to_string(),
        );
    }
    Ok(())
}

/// Validate `KEY=VALUE` environment entries
pub fn validate_env(subject: &str, env: &[String]) -> Result<()> {
    for entry in env {
        match entry.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => {
                return Err(CdiError::invalid_edits(
                    subject,
                    format!("invalid environment variable {:?}", entry),
                ))
            }
        }
    }
    Ok(())
}

/// Resolve a hook name, rejecting anything outside the OCI lifecycle phases
pub fn validate_hook_name(subject: &str, hook_name: &str) -> Result<HookName> {
    hook_name.parse().map_err(|_| CdiError::UnsupportedHook {
        subject: subject.to_string(),
        hook: hook_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_annotations() {
        let valid = annotations(&[
            ("key", "value"),
            ("vendor.com/key", "value"),
            ("Vendor.Com/Some_Key.v1", "value"),
            ("a", ""),
        ]);
        assert!(validate_annotations("vendor.com/gpu", &valid).is_ok());
    }

    #[test]
    fn test_invalid_annotation_keys_are_collected() {
        let invalid = annotations(&[
            ("a/b/c", "value"),
            ("/key", "value"),
            ("vendor.com/", "value"),
            ("-key", "value"),
        ]);
        let err = validate_annotations("vendor.com/gpu=dev1", &invalid).unwrap_err();
        match err {
            CdiError::InvalidAnnotations { subject, reason } => {
                assert_eq!(subject, "vendor.com/gpu=dev1");
                assert_eq!(reason.matches("is invalid").count(), 4);
            }
            other => panic!("Expected InvalidAnnotations, got {:?}", other),
        }
    }

    #[test]
    fn test_annotation_name_length() {
        let long = "k".repeat(QUALIFIED_NAME_MAX_LENGTH + 1);
        let invalid = annotations(&[(long.as_str(), "value")]);
        assert!(validate_annotations("spec", &invalid).is_err());
    }

    #[test]
    fn test_annotation_size_limit() {
        let big = "x".repeat(TOTAL_ANNOTATION_SIZE_LIMIT);
        let too_big = annotations(&[("key", big.as_str())]);
        let err = validate_annotations("spec", &too_big).unwrap_err();
        assert!(err.to_string().contains("larger than limit"));

        let fits = annotations(&[("key", &big[3..])]);
        assert!(validate_annotations("spec", &fits).is_ok());
    }

    #[test]
    fn test_env_entries() {
        let ok = vec!["A=1".to_string(), "B=".to_string(), "C=x=y".to_string()];
        assert!(validate_env("dev1", &ok).is_ok());

        for bad in ["NOVALUE", "=value", ""] {
            let err = validate_env("dev1", &[bad.to_string()]).unwrap_err();
            assert!(matches!(err, CdiError::InvalidEdits { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(
            validate_hook_name("dev1", "createRuntime").unwrap(),
            HookName::CreateRuntime
        );
        let err = validate_hook_name("dev1", "bogusHook").unwrap_err();
        match err {
            CdiError::UnsupportedHook { subject, hook } => {
                assert_eq!(subject, "dev1");
                assert_eq!(hook, "bogusHook");
            }
            other => panic!("Expected UnsupportedHook, got {:?}", other),
        }
    }
}
