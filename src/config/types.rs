//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Port the load balancer listens on (0 = take it from the command line)
    #[serde(default)]
    pub port: u16,

    /// Load balanced services, in selection order
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Load distribution strategy
    #[serde(default)]
    pub strategy: Option<Strategy>,

    /// Seconds between two health check passes
    #[serde(default, alias = "healthCheckInSec")]
    pub health_check_in_sec: u64,

    /// Connect timeout of a single health probe
    #[serde(default = "default_health_check_timeout", with = "humantime_serde")]
    pub health_check_timeout: Duration,

    /// Connect timeout when forwarding a request to a service
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Largest request body accepted from a client, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            port: 0,
            services: Vec::new(),
            strategy: None,
            health_check_in_sec: 0,
            health_check_timeout: default_health_check_timeout(),
            connect_timeout: default_connect_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Config {
    /// The configured strategy, round robin when none was given.
    pub fn strategy(&self) -> Strategy {
        self.strategy.unwrap_or_default()
    }

    /// Interval between health check passes.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_in_sec)
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json, pretty or compact
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// A single load balanced service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service URL, e.g. `http://localhost:8081`
    pub url: String,

    /// Display name (defaults to the URL)
    #[serde(default)]
    pub name: String,

    /// Weight for weighted round robin (0 is treated as 1)
    #[serde(default)]
    pub weight: u32,
}

impl ServiceConfig {
    /// Service declared by URL only, as given on the command line.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            weight: 1,
        }
    }
}

/// Load distribution strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
}

impl Strategy {
    /// Name used in configuration files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::WeightedRoundRobin => "weighted-round-robin",
            Strategy::LeastConnections => "least-connections",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown strategy name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid strategy '{0}', must be one of: round-robin, weighted-round-robin, least-connections")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Strategy::RoundRobin),
            "weighted-round-robin" => Ok(Strategy::WeightedRoundRobin),
            "least-connections" => Ok(Strategy::LeastConnections),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_health_check_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024 // 2MB
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.strategy(), Strategy::RoundRobin);
        assert_eq!(config.health_check_timeout, Duration::from_secs(2));
        assert_eq!(config.max_body_size, 2 * 1024 * 1024);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_strategy_serde() {
        let strategy: Strategy = serde_yaml::from_str("round-robin").unwrap();
        assert_eq!(strategy, Strategy::RoundRobin);

        let strategy: Strategy = serde_yaml::from_str("weighted-round-robin").unwrap();
        assert_eq!(strategy, Strategy::WeightedRoundRobin);

        let strategy: Strategy = serde_yaml::from_str("least-connections").unwrap();
        assert_eq!(strategy, Strategy::LeastConnections);

        assert!(serde_yaml::from_str::<Strategy>("random").is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "least-connections".parse::<Strategy>(),
            Ok(Strategy::LeastConnections)
        );
        let err = "ip-hash".parse::<Strategy>().unwrap_err();
        assert!(err.to_string().contains("ip-hash"));
        assert_eq!(Strategy::WeightedRoundRobin.to_string(), "weighted-round-robin");
    }

    #[test]
    fn test_camel_case_interval_alias() {
        let config: Config = serde_yaml::from_str("healthCheckInSec: 15\n").unwrap();
        assert_eq!(config.health_check_in_sec, 15);
        assert_eq!(config.health_check_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_service_defaults() {
        let service: ServiceConfig = serde_yaml::from_str("url: http://localhost:8081\n").unwrap();
        assert_eq!(service.weight, 0);
        assert!(service.name.is_empty());

        let cli = ServiceConfig::from_url("http://localhost:8082");
        assert_eq!(cli.name, "http://localhost:8082");
        assert_eq!(cli.weight, 1);
    }
}
