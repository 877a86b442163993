//! Domain rule patterns
//!
//! Parsing and normalization of rule entries. A pattern is either an exact
//! hostname ("ads.example.com") or a wildcard suffix ("*.example.com").
//! Patterns are case-insensitive and stored without a trailing dot.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// What the resolver does with a matching query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Sinkhole the query with a synthetic NXDOMAIN
    Block,
    /// Forward the query upstream, punching a hole in a wider block rule
    Allow,
}

/// A single, immutable domain rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Normalized pattern (exact hostname or `*.` wildcard suffix)
    pub pattern: String,
    /// Block or allow
    pub action: RuleAction,
    /// Creation timestamp, unix seconds
    pub created_at: u64,
}

impl DomainRule {
    /// Parse and normalize a raw pattern into a rule
    pub fn parse(pattern: &str, action: RuleAction) -> Result<Self> {
        Ok(Self {
            pattern: normalize_pattern(pattern)?,
            action,
            created_at: unix_now(),
        })
    }

    /// Whether this rule is a wildcard suffix pattern
    pub fn is_wildcard(&self) -> bool {
        self.pattern.starts_with("*.")
    }

    /// The hostname part of the pattern, wildcard prefix stripped
    pub fn host(&self) -> &str {
        self.pattern.strip_prefix("*.").unwrap_or(&self.pattern)
    }
}

/// Normalize a query name: trim, lowercase, strip the trailing dot
pub fn normalize_name(name: &str) -> String {
    let name = name.trim().trim_end_matches('.');
    name.to_lowercase()
}

/// Normalize and validate a rule pattern
///
/// Returns [`Error::InvalidRule`] when the pattern is empty, contains a
/// wildcard anywhere but the leading label, or is not a plausible hostname.
pub fn normalize_pattern(raw: &str) -> Result<String> {
    let pattern = normalize_name(raw);
    if pattern.is_empty() {
        return Err(Error::invalid_rule(raw, "empty pattern"));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(&pattern);
    validate_hostname(host).map_err(|message| Error::invalid_rule(raw, message))?;

    Ok(pattern)
}

fn validate_hostname(host: &str) -> std::result::Result<(), String> {
    if host.is_empty() {
        return Err("empty hostname".to_string());
    }
    if host.len() > 253 {
        return Err(format!("hostname too long ({} > 253)", host.len()));
    }
    if host.contains('*') {
        return Err("wildcard only allowed as leading label".to_string());
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err("empty label".to_string());
        }
        if label.len() > 63 {
            return Err(format!("label '{label}' too long ({} > 63)", label.len()));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("label '{label}' contains invalid characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{label}' starts or ends with a hyphen"));
        }
    }

    Ok(())
}

/// Current time as unix seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
