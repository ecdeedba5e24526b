//! AFDO pipeline configuration
//!
//! Provides the explicit configuration value handed to the artifact pipeline:
//! - Remote storage roots for every artifact family and tier
//! - Merge weights for release profiles
//! - Kernel profile staleness thresholds
//! - Board eligibility tables
//! - Polling bounds and toolchain checkout settings
//!
//! # Configuration Hierarchy
//!
//! Values are resolved in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Pipeline config file (./afdo.toml, searched upwards)
//! 3. Environment variables (AFDO_*)
//! 4. CLI flags (handled by the driver)
//!
//! # Example
//!
//! ```no_run
//! use afdo_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{}", loaded.config.storage.orderfile_unvetted);
//! ```

pub mod loader;
pub mod pipeline;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown board '{board}' for {table}")]
    UnknownBoard { board: String, table: String },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{ConfigLoader, LoadedConfig, CONFIG_FILE_NAME};
pub use pipeline::{
    join_url, BoardConfig, ChromeConfig, KernelConfig, MergeConfig, PipelineConfig, PollConfig,
    StorageConfig, ToolchainConfig,
};
