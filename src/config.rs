//! Configuration for CDI spec tooling
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (cdi.toml)
//! - Environment variables (CDI__*)
//!
//! ## Example config file (cdi.toml):
//! ```toml
//! [load]
//! priority = 10
//!
//! [validation]
//! schema = "builtin"
//!
//! [write]
//! format = "yaml"
//! overwrite = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::schema::{self, BUILTIN_SCHEMA_NAME};
use crate::spec::SpecFormat;
use crate::validator::SpecValidator;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdiConfig {
    /// Spec loading settings
    #[serde(default)]
    pub load: LoadConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Spec writing settings
    #[serde(default)]
    pub write: WriteConfig,
}

/// Spec loading configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Priority given to loaded specs
    #[serde(default)]
    pub priority: i32,
}

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// `builtin`, `none`, or a path to a JSON schema file
    #[serde(default = "default_schema")]
    pub schema: String,
}

/// Write configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Encoding used for specs written without an explicit extension
    #[serde(default)]
    pub format: SpecFormat,

    /// Replace existing spec files
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

fn default_schema() -> String {
    BUILTIN_SCHEMA_NAME.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
        }
    }
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            format: SpecFormat::default(),
            overwrite: true,
        }
    }
}

impl CdiConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["cdi.toml", ".cdi.toml", "config/cdi.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("io", "cncf", "cdi") {
            let xdg_config = dirs.config_dir().join("cdi.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // CDI__WRITE__FORMAT=json and friends
        builder = builder.add_source(
            Environment::with_prefix("CDI")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The spec validator selected by `[validation] schema`
    pub fn validator(&self) -> Result<Box<dyn SpecValidator>> {
        Ok(Box::new(schema::load(&self.validation.schema)?))
    }
}
