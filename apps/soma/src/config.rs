//! Application configuration.
//!
//! Looked up in order:
//! - the file named by `$SOMA_CONFIG`
//! - `<config_dir>/soma/config.json`
//! - built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use soma_learning::{LearningConfig, DEFAULT_ANALYSIS_INTERVAL, DEFAULT_LOG_CAPACITY};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SOMA_CONFIG";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where chat-completion requests go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub groq_endpoint: Option<String>,
    pub openai_endpoint: Option<String>,
    /// Endpoint for free-form chat (`ask`).
    pub chat_endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            groq_endpoint: Some("http://localhost:3000/api/groq".to_string()),
            openai_endpoint: Some("http://localhost:3000/api/openai".to_string()),
            chat_endpoint: Some("http://localhost:3000/api/chat".to_string()),
            timeout_secs: 30,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomaConfig {
    pub analysis_interval_secs: u64,
    pub log_capacity: usize,
    pub learning: LearningConfig,
    /// Extra directories scanned for module manifests at startup.
    pub manifest_dirs: Vec<PathBuf>,
    /// Also scan `<config_dir>/soma/modules`.
    pub user_manifests: bool,
    pub completion: CompletionConfig,
}

impl Default for SomaConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: DEFAULT_ANALYSIS_INTERVAL.as_secs(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            learning: LearningConfig::default(),
            manifest_dirs: Vec::new(),
            user_manifests: true,
            completion: CompletionConfig::default(),
        }
    }
}

impl SomaConfig {
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs.max(1))
    }

    /// Load from an explicit file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load following the lookup order in the module docs.
    ///
    /// A file named by `$SOMA_CONFIG` must exist. The default location is
    /// optional.
    pub fn load() -> ConfigResult<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            tracing::info!(path = %path.display(), "Loading config from {}", CONFIG_ENV);
            return Self::load_from(&path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::load_from(&path)
            }
            _ => {
                tracing::debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Configured directories followed by the user module directory.
    pub fn manifest_directories(&self) -> Vec<PathBuf> {
        let mut dirs = self.manifest_dirs.clone();
        if self.user_manifests {
            if let Some(user) = user_modules_dir() {
                dirs.push(user);
            }
        }
        dirs
    }
}

/// `<config_dir>/soma`, e.g. `~/.config/soma` on Linux.
pub fn soma_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join("soma"))
}

pub fn default_config_path() -> Option<PathBuf> {
    soma_config_dir().map(|dir| dir.join("config.json"))
}

/// User-installed module manifests.
pub fn user_modules_dir() -> Option<PathBuf> {
    soma_config_dir().map(|dir| dir.join("modules"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"analysis_interval_secs": 5, "learning": {{"usage_frequency_threshold": 2}}}}"#
        )
        .unwrap();

        let config = SomaConfig::load_from(file.path()).unwrap();

        assert_eq!(config.analysis_interval(), Duration::from_secs(5));
        assert_eq!(config.learning.usage_frequency_threshold, 2);
        assert_eq!(config.learning.high_impact_frequency, 10);
        assert_eq!(config.log_capacity, 200);
        assert_eq!(config.completion, CompletionConfig::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            SomaConfig::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            SomaConfig::load_from(Path::new("/nonexistent/soma.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_manifest_directories_order() {
        let config = SomaConfig {
            manifest_dirs: vec![PathBuf::from("/opt/soma/modules")],
            user_manifests: false,
            ..SomaConfig::default()
        };
        assert_eq!(
            config.manifest_directories(),
            [PathBuf::from("/opt/soma/modules")]
        );
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SomaConfig {
            analysis_interval_secs: 0,
            ..SomaConfig::default()
        };
        assert_eq!(config.analysis_interval(), Duration::from_secs(1));
    }
}
