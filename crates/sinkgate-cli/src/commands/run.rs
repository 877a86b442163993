//! Run command - gateway execution

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use sinkgate_core::ondemand::{self, OnDemandEvaluator};
use sinkgate_core::{Config, GatewayController, ResolverEngine, RuleStore};
use sinkgate_platform::{ConnectivityMonitor, LoopbackNetwork};

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Listener bind address (overrides config)
    #[arg(short = 'l', long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Upstream DNS server (overrides config)
    #[arg(short = 'u', long, value_name = "ADDR")]
    pub upstream: Option<SocketAddr>,

    /// Rules file path (overrides config)
    #[arg(long, value_name = "FILE")]
    pub rules_file: Option<String>,

    /// Start and stop the gateway from connectivity changes
    #[arg(long)]
    pub ondemand: bool,
}

/// Execute the run command; returns when the process is interrupted
pub async fn execute(args: RunArgs, mut config: Config) -> Result<()> {
    if let Some(listen) = args.listen {
        config.listener.bind = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.addr = upstream;
    }
    if let Some(rules_file) = args.rules_file {
        config.storage.rules_file = rules_file;
    }
    let ondemand_enabled = args.ondemand || config.ondemand.enabled;

    let store = Arc::new(
        RuleStore::open(&config.storage.rules_file).with_context(|| {
            format!("Failed to open rule store at {}", config.storage.rules_file)
        })?,
    );
    info!(
        rules = store.active().len(),
        version = store.version(),
        "Rule store ready"
    );

    let engine = Arc::new(ResolverEngine::new(config.upstream_config()));
    let gateway = Arc::new(GatewayController::new(
        store,
        engine,
        Arc::new(LoopbackNetwork::new()),
        config.gateway_config(),
    ));

    let driver = if ondemand_enabled {
        let evaluator = OnDemandEvaluator::new(
            config.debounce(),
            config.ondemand.trusted_interfaces.clone(),
        );
        let monitor = ConnectivityMonitor {
            probe_addr: config.upstream.addr,
            ..ConnectivityMonitor::default()
        };
        let (events, monitor_task) = monitor.spawn();
        info!("On-demand activation enabled, waiting for connectivity");
        let drive_task = tokio::spawn(ondemand::drive(evaluator, events, gateway.clone()));
        Some((monitor_task, drive_task))
    } else {
        gateway.start().await.context("Failed to start gateway")?;
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Interrupt received, shutting down");

    if let Some((monitor_task, drive_task)) = driver {
        monitor_task.abort();
        drive_task.abort();
    }
    gateway.stop().await.context("Failed to stop gateway")?;

    let stats = gateway.engine().stats();
    info!(
        queries = stats.queries(),
        blocked = stats.blocked(),
        forwarded = stats.forwarded(),
        timeouts = stats.timeouts(),
        "Final counters"
    );

    Ok(())
}
