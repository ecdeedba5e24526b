//! Configuration Loader
//!
//! Finds `afdo.toml` and applies environment overrides on top of it.

use crate::pipeline::PipelineConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the pipeline configuration file
pub const CONFIG_FILE_NAME: &str = "afdo.toml";

/// Configuration loader
///
/// Resolves configuration with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. afdo.toml (nearest ancestor of the start directory)
/// 3. Environment variables (AFDO_*) - highest priority here; CLI flags are
///    applied by the caller
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used by tests and dry runs)
    ignore_env: bool,
}

/// Loaded configuration with its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: PipelineConfig,

    /// Directory containing the afdo.toml that was used, if any
    pub config_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Disable AFDO_* environment overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find afdo.toml. When none exists the
    /// built-in defaults are used.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (config_root, config) = self.find_config(start_dir)?;
        let config = self.apply_env_overrides(config)?;

        Ok(LoadedConfig {
            config,
            config_root,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let config = PipelineConfig::load_from_file(config_path)?;
        let config = self.apply_env_overrides(config)?;

        Ok(LoadedConfig {
            config,
            config_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    fn find_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, PipelineConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = PipelineConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, PipelineConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Recognized variables: AFDO_OVERLAY, AFDO_UTILS_PATH, AFDO_POLL_TIMEOUT,
    /// AFDO_POLL_PERIOD, AFDO_CWP_WEIGHT.
    fn apply_env_overrides(&self, mut config: PipelineConfig) -> ConfigResult<PipelineConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(overlay) = env::var("AFDO_OVERLAY") {
            config.chrome.overlay = PathBuf::from(overlay);
        }

        if let Ok(path) = env::var("AFDO_UTILS_PATH") {
            config.toolchain.utils_path = PathBuf::from(path);
        }

        if let Ok(timeout) = env::var("AFDO_POLL_TIMEOUT") {
            config.poll.timeout_secs = parse_number("AFDO_POLL_TIMEOUT", &timeout)?;
        }

        if let Ok(period) = env::var("AFDO_POLL_PERIOD") {
            config.poll.period_secs = parse_number("AFDO_POLL_PERIOD", &period)?;
        }

        if let Ok(weight) = env::var("AFDO_CWP_WEIGHT") {
            config.merge.cwp_weight = parse_number("AFDO_CWP_WEIGHT", &weight)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("'{}' is not a number", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[chrome]
arch = "arm64"
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let loaded = ConfigLoader::new().without_env().load_from_directory(&sub_dir).unwrap();

        assert_eq!(loaded.config.chrome.arch, "arm64");
        assert_eq!(loaded.config_root.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    fn test_no_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let loaded = ConfigLoader::new()
            .without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert!(loaded.config_root.is_none());
        assert_eq!(loaded.config, PipelineConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_override_poll_period() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[poll]
period_secs = 10
"#,
        );

        env::set_var("AFDO_POLL_PERIOD", "2");

        let loaded = ConfigLoader::new().load_from_directory(temp_dir.path()).unwrap();
        assert_eq!(loaded.config.poll.period_secs, 2);

        env::remove_var("AFDO_POLL_PERIOD");
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("AFDO_CWP_WEIGHT", "lots");

        let result = ConfigLoader::new().load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        env::remove_var("AFDO_CWP_WEIGHT");
    }
}
