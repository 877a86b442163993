//! Error types for sinkgate-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use std::time::Duration;
use thiserror::Error;

/// Main error type for sinkgate-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Rule pattern is malformed or duplicates an existing one
    #[error("Invalid rule '{pattern}': {message}")]
    InvalidRule {
        /// Offending pattern as submitted
        pattern: String,
        /// Why it was rejected
        message: String,
    },

    /// Rule pattern not present in the active rule set
    #[error("No rule found for pattern '{pattern}'")]
    NotFound {
        /// Normalized pattern that was looked up
        pattern: String,
    },

    /// Durable storage write failed; the in-memory rule set was not advanced
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Listener socket could not be bound
    #[error("Failed to bind listener on {addr}: {message}")]
    Bind {
        /// Requested listen address
        addr: String,
        /// Underlying socket error
        message: String,
    },

    /// Route or DNS installation through the network collaborator failed
    #[error("Route installation failed: {0}")]
    RouteInstall(String),

    /// Session establishment exceeded its deadline
    #[error("Gateway start timed out after {elapsed:?}")]
    StartTimeout {
        /// Deadline that was exceeded
        elapsed: Duration,
    },

    /// Upstream resolver did not answer within the forwarding deadline
    #[error("Upstream resolver timed out after {elapsed:?}")]
    UpstreamTimeout {
        /// Deadline that was exceeded
        elapsed: Duration,
    },

    /// Operation is not permitted in the current session state
    #[error("Operation '{operation}' is not valid in state '{state}'")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Session state at the time
        state: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// DNS message could not be parsed
    #[error("DNS message error: {0}")]
    DnsParse(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid rule error
    pub fn invalid_rule(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a DNS parse error
    pub fn dns_parse(message: impl Into<String>) -> Self {
        Self::DnsParse(message.into())
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_rule("*.*.com", "wildcard only allowed as leading label");
        assert!(err.to_string().contains("*.*.com"));
        assert!(err.to_string().contains("leading label"));

        let err = Error::StartTimeout {
            elapsed: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::InvalidState {
            operation: "apply_rule_update",
            state: "idle".to_string(),
        };
        assert!(err.to_string().contains("apply_rule_update"));
        assert!(err.to_string().contains("idle"));
    }
}
