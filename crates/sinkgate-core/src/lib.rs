//! # Sinkgate Core
//!
//! Platform-independent core of the domain-blocking DNS gateway.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Rule storage and matching** - Versioned, copy-on-write rule sets
//!   with longest-suffix domain matching
//! - **Resolver engine** - UDP DNS interception: block with NXDOMAIN,
//!   forward everything else upstream
//! - **On-demand evaluation** - Debounced connectivity state machine
//! - **Gateway control** - Tunnel session lifecycle with bounded retries
//! - **Configuration** - TOML configuration with per-section defaults
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sinkgate_core::{ClientApi, Config, GatewayController, ResolverEngine, RuleStore};
//! use sinkgate_core::rules::RuleAction;
//!
//! # async fn run(network: Arc<dyn sinkgate_core::net::NetworkCollaborator>)
//! # -> sinkgate_core::Result<()> {
//! let config = Config::load("sinkgate.toml")?;
//! let store = Arc::new(RuleStore::open(&config.storage.rules_file)?);
//! let engine = Arc::new(ResolverEngine::new(config.upstream_config()));
//! let gateway = Arc::new(GatewayController::new(
//!     store.clone(),
//!     engine,
//!     network,
//!     config.gateway_config(),
//! ));
//!
//! let api = ClientApi::new(store, gateway.clone());
//! api.add_domain("*.tracker.net", RuleAction::Block).await?;
//! gateway.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod dns;
pub mod error;
pub mod gateway;
pub mod net;
pub mod ondemand;
pub mod rules;

// Re-exports for convenience
pub use api::ClientApi;
pub use config::Config;
pub use dns::{Decision, ResolverEngine, UpstreamConfig};
pub use error::{Error, Result};
pub use gateway::{GatewayConfig, GatewayController, GatewayEvent, TunnelState};
pub use ondemand::{GatewayCommand, OnDemandEvaluator};
pub use rules::{DomainRule, RuleAction, RuleSet, RuleStore};
