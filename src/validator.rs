//! Pluggable spec validation
//!
//! Hosts can impose extra rules on spec content beyond the structural checks
//! done here. A validator is handed to every load and write call explicitly;
//! there is no process-wide registration.

use crate::error::{CdiError, Result};
use crate::specs::RawSpec;

/// Extra validation of spec content, consulted on load and before write.
///
/// Errors are treated as opaque: they are wrapped into
/// [`CdiError::ExternalValidation`] and only displayed.
pub trait SpecValidator: Send + Sync {
    fn validate(&self, spec: &RawSpec) -> anyhow::Result<()>;
}

impl<F> SpecValidator for F
where
    F: Fn(&RawSpec) -> anyhow::Result<()> + Send + Sync,
{
    fn validate(&self, spec: &RawSpec) -> anyhow::Result<()> {
        self(spec)
    }
}

/// Validator accepting everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NopValidator;

impl SpecValidator for NopValidator {
    fn validate(&self, _spec: &RawSpec) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn run_validator(validator: &dyn SpecValidator, spec: &RawSpec) -> Result<()> {
    validator
        .validate(spec)
        .map_err(CdiError::ExternalValidation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_validator_error_is_wrapped() {
        let deny_kind = |spec: &RawSpec| -> anyhow::Result<()> {
            anyhow::ensure!(spec.kind != "vendor.com/denied", "kind {} is denied", spec.kind);
            Ok(())
        };

        assert!(run_validator(&deny_kind, &RawSpec::new("vendor.com/gpu")).is_ok());

        let err = run_validator(&deny_kind, &RawSpec::new("vendor.com/denied")).unwrap_err();
        assert!(matches!(err, CdiError::ExternalValidation(_)));
        assert_eq!(
            err.to_string(),
            "Spec validation failed: kind vendor.com/denied is denied"
        );
    }

    #[test]
    fn test_nop_validator() {
        assert!(run_validator(&NopValidator, &RawSpec::new("anything")).is_ok());
    }
}
