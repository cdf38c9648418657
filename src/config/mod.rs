//! Configuration management for Multimat
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use multimat::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MULTIMAT__<section>__<key>`
//!
//! Examples:
//! - `MULTIMAT__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MULTIMAT__LIMITS__MAX_UPLOAD_BYTES=10MB`
//! - `MULTIMAT__RETENTION__DELAY=6s`
//! - `MULTIMAT__SERVER__ALLOWED_ORIGINS=https://a.example.com,https://b.example.com`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/multimat.toml`.
//! This can be overridden using the `MULTIMAT_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, ConversionConfig, RetentionConfig, ServerConfig, StorageConfig, UploadLimits,
};
pub use validation::ValidationError;

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
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MULTIMAT__*`)
    /// 2. TOML file (default: `config/multimat.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides still apply on top of the file.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration built in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
