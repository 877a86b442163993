//! Connectivity monitoring
//!
//! Periodically probes a well-known endpoint and pushes connectivity
//! transitions into a channel the on-demand evaluator consumes. Only
//! changes are emitted, a stable link produces no traffic on the channel.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sinkgate_core::net::{InterfaceType, NetworkState};

/// Probe-based connectivity watcher
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    /// Endpoint whose reachability stands in for "online"
    pub probe_addr: SocketAddr,
    /// Time between probes
    pub interval: Duration,
    /// Deadline for one probe attempt
    pub probe_timeout: Duration,
    /// Interface type reported in emitted states
    pub interface: InterfaceType,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self {
            probe_addr: ([1, 1, 1, 1], 53).into(),
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            interface: InterfaceType::Other,
        }
    }
}

impl ConnectivityMonitor {
    /// Start probing; the task exits when the receiver is dropped
    pub fn spawn(self) -> (mpsc::Receiver<NetworkState>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(self.run(tx));
        (rx, task)
    }

    async fn run(self, tx: mpsc::Sender<NetworkState>) {
        info!(probe = %self.probe_addr, "Connectivity monitor running");
        let mut last: Option<bool> = None;
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            let connected = self.probe().await;

            if last == Some(connected) {
                continue;
            }
            last = Some(connected);

            let state = if connected {
                NetworkState::connected(self.interface)
            } else {
                NetworkState::disconnected()
            };
            debug!(?state, "Connectivity transition");
            if tx.send(state).await.is_err() {
                debug!("Connectivity receiver dropped, monitor exiting");
                return;
            }
        }
    }

    async fn probe(&self) -> bool {
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect(self.probe_addr)).await,
            Ok(Ok(_))
        )
    }
}
