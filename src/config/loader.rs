// src/config/loader.rs
//! Layered configuration loader: defaults, then TOML files, then environment

use crate::config::{constants::paths, SystemConfig};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
    current_config: SystemConfig,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration parse error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("configuration validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigLoader {
    /// Loader over the conventional file locations
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Loader over explicit files, later files take precedence
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: paths::ENV_PREFIX.to_string(),
            current_config: SystemConfig::default(),
        }
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load, merge and validate the system configuration
    pub fn load(&mut self) -> Result<SystemConfig, ConfigError> {
        let defaults = Config::try_from(&SystemConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "Merging configuration file");
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator(paths::ENV_SEPARATOR)
                .separator(paths::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: SystemConfig = builder.build()?.try_deserialize()?;
        config.validate_consistency().map_err(ConfigError::Validation)?;

        info!(
            source = ?config.acquisition.source,
            base_dir = %config.storage.base_dir.display(),
            "Configuration loaded"
        );
        self.current_config = config.clone();
        Ok(config)
    }

    /// Last successfully loaded configuration
    pub fn current(&self) -> &SystemConfig {
        &self.current_config
    }

    /// Export current configuration to file
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(&self.current_config)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::CONFIG_FILE_NAME),
            Path::new(paths::CONFIG_DIR).join(paths::CONFIG_FILE_NAME),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
