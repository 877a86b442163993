//! CLI commands

pub mod config;
pub mod domains;
pub mod run;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::debug;

use sinkgate_core::Config;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the DNS gateway (main command)
    Run(run::RunArgs),

    /// Manage domain rules
    Domains(domains::DomainsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

/// Default config file name, looked up in the working directory
const DEFAULT_CONFIG: &str = "sinkgate.toml";

/// Load the configuration, falling back to defaults when no file is found
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config from {path:?}"))?
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                Config::load(&default)
                    .with_context(|| format!("Failed to load config from {default:?}"))?
            } else {
                debug!("No config file found, using defaults");
                Config::default()
            }
        }
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
