//! Configuration management for chartsync
//!
//! Tool settings come from a layered system:
//! 1. Default values (embedded in structs)
//! 2. TOML settings file
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Usage
//!
//! ```no_run
//! use chartsync::config::Settings;
//!
//! let settings = Settings::load().expect("Failed to load settings");
//! println!("Workers: {}", settings.sync.workers);
//! ```
//!
//! # Environment Variables
//!
//! Settings can be overridden using environment variables with the pattern:
//! `CHARTSYNC__<section>__<key>`
//!
//! Examples:
//! - `CHARTSYNC__SYNC__WORKERS=8`
//! - `CHARTSYNC__HTTP__RETRIES=5`
//! - `CHARTSYNC__COMMANDS__UPLOAD="jf rt u {path} {repo}/{name}/"`
//!
//! # Settings File
//!
//! By default, settings are loaded from `config/chartsync.toml`.
//! This can be overridden using the `CHARTSYNC_CONFIG` environment variable.
//!
//! The chart list itself lives in a separate YAML [`Manifest`].

mod manifest;
mod models;
mod sources;
mod validation;

pub use manifest::{ChartSpec, Manifest, ManifestError};
pub use models::{HttpSettings, Settings, SyncSettings};
pub use sources::config_path;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Settings validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Settings {
    /// Load settings from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is malformed or a value fails
    /// validation (zero workers, zero timeouts, incomplete command templates).
    pub fn load() -> Result<Self, ConfigError> {
        let settings = sources::load()?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let settings = sources::load_from_sources(path)?;
        validation::validate(&settings)?;
        Ok(settings)
    }

    /// Re-check after command-line overrides were applied
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
