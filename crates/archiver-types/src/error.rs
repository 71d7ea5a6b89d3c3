//! Error types shared by the archiver crates.

use thiserror::Error;

/// Configuration loading and validation errors.
///
/// Any of these is fatal to the process: the daemon refuses to start with
/// a configuration it cannot load or that fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// A configuration value is out of range or inconsistent
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}
