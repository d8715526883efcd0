//! JSON Schema validation of spec content
//!
//! A [`JsonSchemaValidator`] is a [`SpecValidator`] checking a spec against a
//! JSON schema. The crate embeds a builtin CDI schema; hosts can also load
//! their own from disk, or disable schema checks entirely.
//!
//! ## Schema sources
//! - `builtin`: the embedded schema (the default)
//! - `none` or empty: no schema, everything passes
//! - anything else: path to a JSON schema file

use std::fs;
use std::path::Path;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CdiError, Result};
use crate::specs::RawSpec;
use crate::validator::SpecValidator;

/// Name selecting the embedded schema
pub const BUILTIN_SCHEMA_NAME: &str = "builtin";

/// Name selecting no schema at all
pub const NONE_SCHEMA_NAME: &str = "none";

const BUILTIN_SCHEMA: &str = include_str!("../schema/schema.json");

/// Validates specs against a compiled JSON schema
pub struct JsonSchemaValidator {
    /// Where the schema came from, for diagnostics
    source: String,
    /// `None` for the no-op schema
    schema: Option<JSONSchema>,
}

impl JsonSchemaValidator {
    /// The embedded CDI schema.
    ///
    /// Falls back to the no-op schema if the embedded one fails to compile.
    pub fn builtin() -> Self {
        let compiled = serde_json::from_str::<Value>(BUILTIN_SCHEMA)
            .map_err(|e| e.to_string())
            .and_then(|value| compile(&value));

        match compiled {
            Ok(schema) => Self {
                source: BUILTIN_SCHEMA_NAME.to_string(),
                schema: Some(schema),
            },
            Err(reason) => {
                warn!(%reason, "builtin CDI schema does not compile, schema validation disabled");
                Self::nop()
            }
        }
    }

    /// A schema that accepts everything
    pub fn nop() -> Self {
        Self {
            source: NONE_SCHEMA_NAME.to_string(),
            schema: None,
        }
    }

    /// Compile a schema from a JSON value
    pub fn from_value(source: impl Into<String>, schema: &Value) -> Result<Self> {
        let source = source.into();
        let compiled = compile(schema).map_err(|reason| CdiError::Schema {
            source_name: source.clone(),
            reason,
        })?;
        Ok(Self {
            source,
            schema: Some(compiled),
        })
    }

    /// Load and compile a schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let schema_err = |reason: String| CdiError::Schema {
            source_name: source.clone(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| schema_err(e.to_string()))?;
        let value: Value = serde_json::from_str(&content).map_err(|e| schema_err(e.to_string()))?;
        debug!(schema = %source, "loaded JSON schema");
        Self::from_value(source.clone(), &value)
    }

    /// Where this schema came from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check whether this is the no-op schema
    pub fn is_nop(&self) -> bool {
        self.schema.is_none()
    }

    /// Validate a JSON document, returning every violation found
    pub fn validate_value(&self, instance: &Value) -> std::result::Result<(), Vec<String>> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };

        schema.validate(instance).map_err(|errors| {
            errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect()
        })
    }
}

impl SpecValidator for JsonSchemaValidator {
    fn validate(&self, spec: &RawSpec) -> anyhow::Result<()> {
        if self.is_nop() {
            return Ok(());
        }

        let instance = serde_json::to_value(spec)?;
        self.validate_value(&instance).map_err(|errors| {
            anyhow::anyhow!(
                "schema {} violated:\n{}",
                self.source,
                errors.join("\n")
            )
        })
    }
}

/// Load a schema by source name.
///
/// `"builtin"` selects the embedded schema, `"none"` or an empty string the
/// no-op schema. Anything else is read as a schema file path.
pub fn load(source: &str) -> Result<JsonSchemaValidator> {
    match source.trim() {
        BUILTIN_SCHEMA_NAME => Ok(JsonSchemaValidator::builtin()),
        NONE_SCHEMA_NAME | "" => Ok(JsonSchemaValidator::nop()),
        path => JsonSchemaValidator::from_file(path),
    }
}

fn compile(schema: &Value) -> std::result::Result<JSONSchema, String> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| e.to_string())
}
