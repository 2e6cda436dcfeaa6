//! Manifest file import.
//!
//! Reads `.json`, `.yaml` and `.yml` documents. A bad file is logged and
//! reported, never fatal to the rest of the batch.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::manifest::{ManifestFormat, ModuleManifest};
use crate::registry::ModuleRegistry;

/// Largest manifest file accepted, in bytes.
pub const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// Result of loading manifests from a directory.
#[derive(Debug, Default)]
pub struct LoadResult {
    /// Successfully parsed manifests.
    pub manifests: Vec<ModuleManifest>,
    /// Errors encountered during loading.
    pub errors: Vec<RegistryError>,
}

/// Outcome of importing a batch of files into a registry.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Ids that were newly registered.
    pub registered: Vec<String>,
    /// Ids that parsed fine but were already registered.
    pub duplicates: Vec<String>,
    /// Files that could not be imported.
    pub errors: Vec<RegistryError>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse manifest content (for testing without filesystem).
///
/// `path` is only used for error reporting.
pub fn parse_manifest(
    content: &str,
    format: ManifestFormat,
    path: &Path,
) -> RegistryResult<ModuleManifest> {
    let mut manifest: ModuleManifest = match format {
        ManifestFormat::Json => {
            serde_json::from_str(content).map_err(|e| RegistryError::InvalidJson {
                path: path.to_path_buf(),
                source: e,
            })?
        }
        ManifestFormat::Yaml => {
            serde_yml::from_str(content).map_err(|e| RegistryError::InvalidYaml {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        }
    };

    manifest.id = manifest.id.trim().to_string();
    validate_manifest(&manifest, path)?;
    Ok(manifest)
}

fn validate_manifest(manifest: &ModuleManifest, path: &Path) -> RegistryResult<()> {
    if manifest.id.is_empty() {
        return Err(RegistryError::MissingField {
            path: path.to_path_buf(),
            field: "id".to_string(),
        });
    }
    if manifest.name.trim().is_empty() {
        return Err(RegistryError::MissingField {
            path: path.to_path_buf(),
            field: "name".to_string(),
        });
    }
    Ok(())
}

/// Load a single manifest file.
pub fn load_manifest(path: &Path) -> RegistryResult<ModuleManifest> {
    let format = ManifestFormat::from_path(path).ok_or_else(|| RegistryError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let size = std::fs::metadata(path)
        .map_err(|e| RegistryError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if size > MAX_MANIFEST_BYTES {
        return Err(RegistryError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_MANIFEST_BYTES,
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| RegistryError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_manifest(&content, format, path)
}

/// Load every manifest file directly inside `dir`, sorted by file name.
///
/// Files with other extensions and subdirectories are ignored.
pub fn load_manifests_from_directory(dir: &Path) -> LoadResult {
    let mut result = LoadResult::default();

    if !dir.exists() {
        debug!(path = %dir.display(), "Manifest directory does not exist");
        return result;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(path = %dir.display(), error = %e, "Failed to read manifest directory");
            return result;
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && ManifestFormat::from_path(p).is_some())
        .collect();
    files.sort();

    for path in files {
        match load_manifest(&path) {
            Ok(manifest) => {
                debug!(module = %manifest.id, path = %path.display(), "Loaded manifest");
                result.manifests.push(manifest);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping manifest");
                result.errors.push(e);
            }
        }
    }

    result
}

/// Import files and directories into `registry`, in the order given.
pub fn import_manifests(registry: &ModuleRegistry, paths: &[PathBuf]) -> ImportReport {
    let mut report = ImportReport::default();

    for path in paths {
        let loaded = if path.is_dir() {
            load_manifests_from_directory(path)
        } else {
            match load_manifest(path) {
                Ok(manifest) => LoadResult {
                    manifests: vec![manifest],
                    errors: Vec::new(),
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping manifest");
                    LoadResult {
                        manifests: Vec::new(),
                        errors: vec![e],
                    }
                }
            }
        };

        report.errors.extend(loaded.errors);
        for manifest in loaded.manifests {
            let id = manifest.id.clone();
            if registry.register(manifest) {
                report.registered.push(id);
            } else {
                report.duplicates.push(id);
            }
        }
    }

    info!(
        registered = report.registered.len(),
        duplicates = report.duplicates.len(),
        error_count = report.errors.len(),
        "Manifests imported"
    );

    report
}
