//! Configuration management for stembox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use stembox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Backend: {}", config.backend.base_url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `STEMBOX__<section>__<key>`
//!
//! Examples:
//! - `STEMBOX__BACKEND__BASE_URL=http://10.0.0.5:8000`
//! - `STEMBOX__TRACKER__RECONNECT__MAX_ATTEMPTS=0`
//!
//! `BACKEND_BASE_URL` is also honoured and takes precedence over the prefixed form.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/stembox.toml`.
//! This can be overridden using the `STEMBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    BackendConfig, Config, DownloadConfig, ReconnectConfig, TelemetryConfig, TrackerConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails (bad backend URL, inconsistent backoff, ...).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still applying environment overrides
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_with_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Override the backend base URL (e.g. from a CLI flag) and re-validate
    pub fn with_backend_url(mut self, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        self.backend.base_url = base_url.into();
        validation::validate(&self)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[download]
file_name = "out.zip"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.download.file_name, "out.zip");
    }

    #[test]
    fn test_validation_catches_bad_backoff() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[tracker.reconnect]
initial_backoff_ms = 60000
max_backoff_ms = 1000
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::BackoffOutOfOrder { .. })
        ));
    }

    #[test]
    fn test_with_backend_url() {
        let config = Config::default()
            .with_backend_url("https://api.example.com/stems")
            .unwrap();
        assert_eq!(config.backend.base_url, "https://api.example.com/stems");

        let err = Config::default().with_backend_url("nope").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError(ValidationError::InvalidBaseUrl(_))
        ));
    }
}
