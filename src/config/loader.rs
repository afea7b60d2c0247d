//! Configuration file loading and command line overrides.

use crate::config::{Config, ServiceConfig, Strategy, validate_config};
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Values supplied on the command line.
///
/// They only fill in what the configuration file leaves unset.
#[derive(Debug, Clone)]
pub struct ConfigOverrides {
    /// Comma separated service URLs.
    pub services: Option<String>,
    /// Listen port.
    pub port: u16,
    /// Load distribution strategy.
    pub strategy: Strategy,
    /// Seconds between health check passes.
    pub health_check_in_sec: u64,
}

impl Default for ConfigOverrides {
    fn default() -> Self {
        Self {
            services: None,
            port: 80,
            strategy: Strategy::RoundRobin,
            health_check_in_sec: 20,
        }
    }
}

/// Load configuration from a YAML file.
///
/// A missing file is not an error: services may still come from the
/// command line, so an empty configuration is returned instead.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(e.into()),
    };

    if contents.trim().is_empty() {
        return Ok(Config::default());
    }

    Ok(serde_yaml::from_str(&contents)?)
}

/// Load the file, merge the command line values and validate the result.
pub fn resolve_config<P: AsRef<Path>>(
    path: P,
    overrides: &ConfigOverrides,
) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, overrides);
    validate_config(&config).map_err(ConfigError::ValidationError)?;
    Ok(config)
}

/// Fill unset configuration values from the command line and normalise services.
pub fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if config.services.is_empty() {
        if let Some(list) = overrides.services.as_deref() {
            config.services = list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(ServiceConfig::from_url)
                .collect();
        }
    }

    for service in &mut config.services {
        if service.weight == 0 {
            service.weight = 1;
        }
        if service.name.is_empty() {
            service.name = service.url.clone();
        }
    }

    if config.port == 0 {
        config.port = overrides.port;
    }

    if config.strategy.is_none() {
        config.strategy = Some(overrides.strategy);
    }

    if config.health_check_in_sec == 0 {
        config.health_check_in_sec = overrides.health_check_in_sec;
    }
}
