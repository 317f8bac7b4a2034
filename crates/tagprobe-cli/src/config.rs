//! Configuration file management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Log levels accepted in `[logging] level`.
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host adapter selection.
    pub adapter: AdapterConfig,
    /// Scan behavior.
    pub scan: ScanConfig,
    /// Diagnostic logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if there is no file.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_or_default(&default_config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.adapter.validate());
        errors.extend(self.logging.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration, falling back to defaults when
    /// `path` does not exist.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Host adapter selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Index into the host's adapter list.
    pub index: usize,
    /// Only report devices whose name contains this text (case-insensitive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_filter: Option<String>,
}

impl AdapterConfig {
    /// Validate adapter configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let Some(filter) = &self.name_filter
            && filter.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "adapter.name_filter".to_string(),
                message: "name filter cannot be empty; remove it to report every device"
                    .to_string(),
            });
        }
        errors
    }
}

/// Scan behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Report every advertisement, not just the first per device.
    pub allow_duplicates: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
        }
    }
}

/// Diagnostic logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let level = self.level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            Vec::new()
        } else {
            vec![ValidationError {
                field: "logging.level".to_string(),
                message: format!(
                    "unknown level '{}': expected one of {}",
                    self.level,
                    LOG_LEVELS.join(", ")
                ),
            }]
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `logging.level`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagprobe")
        .join("config.toml")
}
