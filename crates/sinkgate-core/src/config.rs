//! Configuration management
//!
//! Strongly-typed TOML configuration with per-section defaults. Every
//! section is optional in the file; validation catches values that would
//! make the gateway misbehave at runtime.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gateway::GatewayConfig;
use crate::net::InterfaceType;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General application settings
    pub general: GeneralConfig,

    /// DNS listener settings
    pub listener: ListenerConfig,

    /// Upstream resolver settings
    pub upstream: UpstreamSection,

    /// On-demand activation settings
    pub ondemand: OnDemandConfig,

    /// Rule storage settings
    pub storage: StorageConfig,

    /// Gateway session settings
    pub gateway: GatewaySection,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            listener: ListenerConfig::default(),
            upstream: UpstreamSection::default(),
            ondemand: OnDemandConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewaySection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream.timeout_ms == 0 {
            return Err(Error::config_value(
                "upstream.timeout_ms",
                "must be non-zero",
            ));
        }
        if self.gateway.start_timeout_ms == 0 {
            return Err(Error::config_value(
                "gateway.start_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.gateway.max_start_attempts == 0 {
            return Err(Error::config_value(
                "gateway.max_start_attempts",
                "must be at least 1",
            ));
        }
        if self.ondemand.enabled && self.ondemand.debounce_ms == 0 {
            return Err(Error::config_value(
                "ondemand.debounce_ms",
                "must be non-zero when on-demand is enabled",
            ));
        }
        if self.storage.rules_file.trim().is_empty() {
            return Err(Error::config_value(
                "storage.rules_file",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Gateway tuning derived from the relevant sections
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            listen: self.listener.bind,
            start_timeout: Duration::from_millis(self.gateway.start_timeout_ms),
            max_start_attempts: self.gateway.max_start_attempts,
            retry_backoff: Duration::from_millis(self.gateway.retry_backoff_ms),
        }
    }

    /// Upstream resolver tuning
    pub fn upstream_config(&self) -> crate::dns::UpstreamConfig {
        crate::dns::UpstreamConfig {
            addr: self.upstream.addr,
            timeout: Duration::from_millis(self.upstream.timeout_ms),
        }
    }

    /// Debounce window for the on-demand evaluator
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.ondemand.debounce_ms)
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Profile name, echoed in logs
    pub name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

/// DNS listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for the local resolver
    pub bind: SocketAddr,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5353),
        }
    }
}

/// Upstream resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    /// Upstream DNS server address
    pub addr: SocketAddr,
    /// Deadline for an upstream answer before SERVFAIL, milliseconds
    pub timeout_ms: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53),
            timeout_ms: 3000,
        }
    }
}

/// On-demand activation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnDemandConfig {
    /// Start/stop the gateway from connectivity events
    pub enabled: bool,
    /// Debounce window for connectivity flapping, milliseconds
    pub debounce_ms: u64,
    /// Interfaces treated as trusted in evaluator logs and events
    pub trusted_interfaces: Vec<InterfaceType>,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 2000,
            trusted_interfaces: vec![InterfaceType::Wifi],
        }
    }
}

/// Rule storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the persisted rule file
    pub rules_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rules_file: "sinkgate-rules.json".to_string(),
        }
    }
}

/// Gateway session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Deadline for one session start attempt, milliseconds
    pub start_timeout_ms: u64,
    /// Start attempts before the session parks in Failed
    pub max_start_attempts: u32,
    /// Base backoff between start attempts, milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            start_timeout_ms: 10_000,
            max_start_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log file path (None = stdout only)
    pub file: Option<String>,
    /// Enable JSON format logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listener.bind.port(), 5353);
        assert_eq!(config.upstream.timeout_ms, 3000);
        assert_eq!(config.ondemand.debounce_ms, 2000);
        assert!(!config.ondemand.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_upstream_timeout() {
        let mut config = Config::default();
        config.upstream.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_start_attempts() {
        let mut config = Config::default();
        config.gateway.max_start_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_debounce_only_when_enabled() {
        let mut config = Config::default();
        config.ondemand.debounce_ms = 0;
        assert!(config.validate().is_ok());

        config.ondemand.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_rules_file() {
        let mut config = Config::default();
        config.storage.rules_file = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.general.name = "home".to_string();
        config.upstream.addr = "9.9.9.9:53".parse().unwrap();
        config.ondemand.enabled = true;

        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();

        assert_eq!(parsed.general.name, "home");
        assert_eq!(parsed.upstream.addr, config.upstream.addr);
        assert!(parsed.ondemand.enabled);
    }

    #[test]
    fn test_toml_parse_minimal() {
        let toml_content = r#"
[general]
name = "test"

[listener]
bind = "127.0.0.1:15353"

[ondemand]
enabled = true
trusted_interfaces = ["wifi", "cellular"]
"#;
        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.general.name, "test");
        assert_eq!(config.listener.bind.port(), 15353);
        assert_eq!(config.ondemand.trusted_interfaces.len(), 2);
        // Untouched sections keep their defaults
        assert_eq!(config.upstream.timeout_ms, 3000);
    }

    #[test]
    fn test_toml_parse_invalid() {
        assert!(Config::from_toml("this is not [valid toml").is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = Config::default();
        let gateway = config.gateway_config();
        assert_eq!(gateway.start_timeout, Duration::from_secs(10));
        assert_eq!(gateway.max_start_attempts, 3);

        let upstream = config.upstream_config();
        assert_eq!(upstream.timeout, Duration::from_secs(3));
    }
}
