//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a configuration or token file failed.
    #[error("failed to read {path}")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration document is not valid YAML for the model.
    #[error("failed to parse configuration {origin}")]
    Parse {
        /// File path or other description of the document.
        origin: String,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A token file exists but holds no token.
    #[error("token file {path} is empty")]
    EmptyToken {
        /// Token file path.
        path: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
