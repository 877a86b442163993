//! Client API
//!
//! Thin facade over the rule store and the gateway controller. Every
//! mutation commits a new rule set version and, when a session is active,
//! pushes it into the running resolver. Failures are typed results; there
//! are no silent no-ops.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::{GatewayController, TunnelState};
use crate::rules::{DomainRule, RuleAction, RuleStore};

/// Client-facing control surface
pub struct ClientApi {
    store: Arc<RuleStore>,
    gateway: Arc<GatewayController>,
}

impl ClientApi {
    /// Build the facade over an existing store and controller
    pub fn new(store: Arc<RuleStore>, gateway: Arc<GatewayController>) -> Self {
        Self { store, gateway }
    }

    /// Add a domain rule and return the new rule set version
    ///
    /// Fails with [`Error::InvalidRule`] on a malformed pattern or when the
    /// normalized pattern already exists.
    pub async fn add_domain(&self, pattern: &str, action: RuleAction) -> Result<u64> {
        let rule = DomainRule::parse(pattern, action)?;

        // Read and commit run under the store's writer lock, so concurrent
        // mutations always build on each other instead of overwriting
        let version = self.store.update(move |current| {
            if current.contains(&rule.pattern) {
                return Err(Error::invalid_rule(&rule.pattern, "rule already exists"));
            }
            let mut rules = current.rules().to_vec();
            rules.push(rule);
            Ok(rules)
        })?;

        self.propagate(version).await;
        Ok(version)
    }

    /// Remove a domain rule and return the new rule set version
    ///
    /// Fails with [`Error::NotFound`] when the normalized pattern is absent.
    pub async fn remove_domain(&self, pattern: &str) -> Result<u64> {
        let normalized = crate::rules::normalize_pattern(pattern)?;

        let version = self.store.update(|current| {
            if !current.contains(&normalized) {
                return Err(Error::NotFound {
                    pattern: normalized.clone(),
                });
            }
            Ok(current
                .rules()
                .iter()
                .filter(|r| r.pattern != normalized)
                .cloned()
                .collect())
        })?;

        self.propagate(version).await;
        Ok(version)
    }

    /// Ordered view of the active rule set
    pub fn list_domains(&self) -> Vec<DomainRule> {
        self.store.active().rules().to_vec()
    }

    /// Active rule set version
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Current gateway session state
    pub fn status(&self) -> TunnelState {
        self.gateway.status()
    }

    /// Push a committed version to the resolver when a session is running
    async fn propagate(&self, version: u64) {
        match self.gateway.apply_rule_update(version).await {
            Ok(()) => {}
            Err(Error::InvalidState { .. }) => {
                debug!(version, "No active session, rule update stays persisted");
            }
            Err(e) => {
                // The commit already landed durably; the resolver picks the
                // version up on the next start
                debug!(version, "Deferred rule propagation: {e}");
            }
        }
    }
}
