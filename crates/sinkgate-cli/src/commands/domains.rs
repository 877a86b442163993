//! Domains command - rule management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use sinkgate_core::rules::RuleAction;
use sinkgate_core::{ClientApi, Config, GatewayController, ResolverEngine, RuleStore};
use sinkgate_platform::LoopbackNetwork;

/// Domains command arguments
#[derive(Args, Debug)]
pub struct DomainsArgs {
    #[command(subcommand)]
    pub action: DomainsAction,
}

/// Domains subcommands
#[derive(Subcommand, Debug)]
pub enum DomainsAction {
    /// Add a domain rule
    Add {
        /// Pattern: exact hostname or wildcard like "*.tracker.net"
        pattern: String,

        /// Forward matching queries instead of blocking them
        #[arg(long)]
        allow: bool,
    },

    /// Remove a domain rule
    Remove {
        /// Pattern to remove
        pattern: String,
    },

    /// List the active rule set
    List,
}

/// Execute the domains command against the configured rule store
pub async fn execute(args: DomainsArgs, config: Config) -> Result<()> {
    let store = Arc::new(
        RuleStore::open(&config.storage.rules_file).with_context(|| {
            format!("Failed to open rule store at {}", config.storage.rules_file)
        })?,
    );
    let engine = Arc::new(ResolverEngine::new(config.upstream_config()));
    let gateway = Arc::new(GatewayController::new(
        store.clone(),
        engine,
        Arc::new(LoopbackNetwork::new()),
        config.gateway_config(),
    ));
    let api = ClientApi::new(store, gateway);

    match args.action {
        DomainsAction::Add { pattern, allow } => {
            let action = if allow {
                RuleAction::Allow
            } else {
                RuleAction::Block
            };
            let version = api
                .add_domain(&pattern, action)
                .await
                .with_context(|| format!("Failed to add rule for '{pattern}'"))?;
            info!(version, pattern, "Rule added");
            println!(
                "{} {} (rule set v{})",
                "Added".green().bold(),
                pattern,
                version
            );
        }
        DomainsAction::Remove { pattern } => {
            let version = api
                .remove_domain(&pattern)
                .await
                .with_context(|| format!("Failed to remove rule for '{pattern}'"))?;
            info!(version, pattern, "Rule removed");
            println!(
                "{} {} (rule set v{})",
                "Removed".yellow().bold(),
                pattern,
                version
            );
        }
        DomainsAction::List => {
            let rules = api.list_domains();
            if rules.is_empty() {
                println!("No rules (rule set v{})", api.version());
                return Ok(());
            }

            println!(
                "{} (rule set v{}, {} rules)",
                "Domain rules".bold(),
                api.version(),
                rules.len()
            );
            for rule in rules {
                let action = match rule.action {
                    RuleAction::Block => "block".red(),
                    RuleAction::Allow => "allow".green(),
                };
                println!("  {:<6} {}", action, rule.pattern);
            }
        }
    }

    Ok(())
}
