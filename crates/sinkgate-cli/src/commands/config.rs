//! Config command - configuration management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sinkgate_core::Config;

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "sinkgate.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },
}

/// Execute the config command
pub fn execute(args: ConfigArgs, config: Config) -> Result<()> {
    match args.action {
        ConfigAction::Show => show_config(&config),
        ConfigAction::Init { output } => init_config(output),
        ConfigAction::Validate { file } => validate_config(file),
    }
}

fn show_config(config: &Config) -> Result<()> {
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn init_config(output: PathBuf) -> Result<()> {
    let config = Config::default();
    let toml_str = config.to_toml().context("Failed to serialize config")?;

    let content = format!(
        "# Sinkgate configuration\n\
         # All sections are optional; omitted values take the defaults below\n\n\
         {toml_str}"
    );

    std::fs::write(&output, content)
        .with_context(|| format!("Failed to write config to {output:?}"))?;

    info!("Generated config file: {:?}", output);
    println!("Configuration file generated: {}", output.display());
    Ok(())
}

fn validate_config(file: PathBuf) -> Result<()> {
    let config = Config::load(&file).with_context(|| format!("Failed to load config from {file:?}"))?;

    config.validate().context("Configuration validation failed")?;

    println!("Configuration is valid: {}", file.display());
    Ok(())
}
