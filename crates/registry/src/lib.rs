//! Module registry for SOMA.
//!
//! This crate provides:
//! - The `ModuleManifest` data model
//! - `ModuleRegistry`, an ordered first-write-wins set of manifests
//! - Import of manifests from JSON and YAML files
//!
//! # Example
//!
//! ```ignore
//! use soma_registry::{import_manifests, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new();
//! let report = import_manifests(&registry, &[PathBuf::from("modules")]);
//! ```

mod error;
mod import;
mod manifest;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use import::{
    import_manifests, load_manifest, load_manifests_from_directory, parse_manifest, ImportReport,
    LoadResult, MAX_MANIFEST_BYTES,
};
pub use manifest::{ManifestFormat, ModuleManifest};
pub use registry::{CategoryFilter, ModuleRegistry};
