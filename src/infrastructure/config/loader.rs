use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid concurrency: {0}. Must be between 1 and 256")]
    InvalidConcurrency(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: hourly, daily, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Sandbox endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("Invalid task_timeout_secs: 0. Must be at least 1")]
    InvalidTaskTimeout,

    #[error("Invalid page_size: 0. Must be at least 1")]
    InvalidPageSize,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .verifier/config.yaml
    /// 3. .verifier/local.yaml (optional local overrides)
    /// 4. Environment variables (VERIFIER_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(None)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment variables still
    /// override the file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: Option<&std::path::Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match file {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment
                .merge(Yaml::file(".verifier/config.yaml"))
                .merge(Yaml::file(".verifier/local.yaml")),
        };
        figment.merge(Env::prefixed("VERIFIER_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.sandbox.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if let Some(rps) = config.sandbox.requests_per_second {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(rps));
            }
        }
        if config.sandbox.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidTaskTimeout);
        }

        if !(1..=256).contains(&config.verification.concurrency) {
            return Err(ConfigError::InvalidConcurrency(config.verification.concurrency));
        }
        if config.verification.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }

        Ok(())
    }
}
