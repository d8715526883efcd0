//! Container Device Interface Specs
//!
//! Parsing, validation and application of CDI Spec files. A CDI Spec
//! describes devices a container runtime can inject, and the edits (env
//! variables, device nodes, mounts, hooks) the runtime must make to an OCI
//! runtime configuration to expose each of them.
//!
//! ## Features
//!
//! - **Qualified Names**: `vendor/class=name` device references
//! - **Version Checks**: declared `cdiVersion` against the features in use
//! - **Strict Validation**: names, annotations and edits are checked on load
//! - **Append-only Merging**: edits compose by concatenation into the target
//! - **Atomic Writes**: specs are renamed into place, never half written
//! - **Pluggable Validators**: JSON schema or host supplied checks
//!
//! ## Example
//!
//! ```text
//! cdiVersion: "0.6.0"
//! kind: vendor.com/device
//! devices:
//!   - name: dev1
//!     containerEdits:
//!       env:
//!         - BAR=BARVALUE1
//! ```

pub mod config;
pub mod container_edits;
pub mod device;
pub mod error;
pub mod oci;
pub mod parser;
pub mod schema;
pub mod spec;
pub mod specs;
pub mod validation;
pub mod validator;
pub mod version;

pub use config::CdiConfig;
pub use container_edits::{apply_edits, HookName};
pub use device::{Device, SpecOwner};
pub use error::{CdiError, Result};
pub use oci::RuntimeSpec;
pub use parser::{is_qualified_name, parse_device, parse_qualifier, qualified_name, QualifiedName};
pub use schema::JsonSchemaValidator;
pub use spec::{generate_spec_name, parse_spec, read_spec, write_spec, Spec, SpecFormat};
pub use specs::{ContainerEdits, DeviceNode, Hook, Mount, RawDevice, RawSpec, CURRENT_VERSION};
pub use validator::{NopValidator, SpecValidator};
pub use version::{minimum_required_version, SpecVersion};
