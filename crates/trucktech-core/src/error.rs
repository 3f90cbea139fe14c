//! Core error types for the TruckTech scraper.
//!
//! This module defines the central error type used across all subsystems.
//! Each subsystem error is represented as a variant for clear error propagation.

use thiserror::Error;

/// Central error type for shared TruckTech operations.
#[derive(Error, Debug)]
pub enum TruckTechError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Credentials file exists but is not valid JSON
    #[error("failed to parse credentials file {path}: {source}")]
    CredentialsFile {
        /// Path of the credentials file
        path: String,
        /// JSON parse error
        #[source]
        source: serde_json::Error,
    },

    /// Neither the environment nor the credentials file supplied a login
    #[error(
        "no credentials found: set TRUCKTECH_USERNAME and TRUCKTECH_PASSWORD \
         or create {file}"
    )]
    MissingCredentials {
        /// Credentials file that was checked
        file: String,
    },

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `TruckTechError`.
pub type Result<T> = std::result::Result<T, TruckTechError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TruckTechError::Validation("bad tenant".to_string());
        assert_eq!(err.to_string(), "validation error: bad tenant");

        let err = ConfigError::NoConfigDir;
        assert_eq!(
            err.to_string(),
            "could not determine config directory (XDG base directories not available)"
        );
    }

    #[test]
    fn test_missing_credentials_names_file() {
        let err = ConfigError::MissingCredentials {
            file: ".trucktech_credentials.json".to_string(),
        };
        assert!(err.to_string().contains("TRUCKTECH_USERNAME"));
        assert!(err.to_string().contains(".trucktech_credentials.json"));
    }

    #[test]
    fn test_error_from_config() {
        let config_err = ConfigError::NoConfigDir;
        let err: TruckTechError = config_err.into();
        assert!(matches!(err, TruckTechError::Config(_)));
    }
}
