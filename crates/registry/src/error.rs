//! Error types for manifest loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while reading or validating a manifest.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to read manifest file.
    #[error("Failed to read manifest '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest file exceeds the size limit.
    #[error("Manifest '{path}' is {size} bytes, limit is {limit}")]
    TooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Extension is not .json, .yaml or .yml.
    #[error("Unsupported manifest format: '{path}'")]
    UnsupportedFormat { path: PathBuf },

    /// Invalid JSON document.
    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid YAML document.
    #[error("Invalid YAML in '{path}': {message}")]
    InvalidYaml { path: PathBuf, message: String },

    /// Missing or empty required field.
    #[error("Missing required field '{field}' in '{path}'")]
    MissingField { path: PathBuf, field: String },
}

impl RegistryError {
    /// The file the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            RegistryError::ReadFile { path, .. }
            | RegistryError::TooLarge { path, .. }
            | RegistryError::UnsupportedFormat { path }
            | RegistryError::InvalidJson { path, .. }
            | RegistryError::InvalidYaml { path, .. }
            | RegistryError::MissingField { path, .. } => path,
        }
    }
}
