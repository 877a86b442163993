//! Loopback network collaborator
//!
//! Records what the gateway asked for instead of touching the OS. Real
//! route-table and resolver plumbing varies per OS and stays behind the
//! same trait; local runs and tests use this implementation.

use parking_lot::Mutex;
use std::net::IpAddr;
use tracing::info;

use sinkgate_core::net::{InterfaceSpec, NetworkCollaborator};

/// What the loopback collaborator believes is currently installed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledState {
    /// Spec of the installed routes, when present
    pub routes: Option<InterfaceSpec>,
    /// DNS servers currently pointed at the resolver
    pub dns_servers: Vec<IpAddr>,
}

/// Collaborator for local runs: logs and records, never touches the OS
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    installed: Mutex<InstalledState>,
}

impl LoopbackNetwork {
    /// Create a collaborator with nothing installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded installation state
    pub fn installed(&self) -> InstalledState {
        self.installed.lock().clone()
    }
}

impl NetworkCollaborator for LoopbackNetwork {
    fn install_routes(&self, spec: &InterfaceSpec) -> sinkgate_core::Result<()> {
        info!(listen = %spec.listen, "Recording route installation");
        self.installed.lock().routes = Some(spec.clone());
        Ok(())
    }

    fn remove_routes(&self) -> sinkgate_core::Result<()> {
        info!("Recording route removal");
        self.installed.lock().routes = None;
        Ok(())
    }

    fn set_dns_servers(&self, servers: &[IpAddr]) -> sinkgate_core::Result<()> {
        info!(?servers, "Recording DNS server installation");
        self.installed.lock().dns_servers = servers.to_vec();
        Ok(())
    }

    fn clear_dns_servers(&self) -> sinkgate_core::Result<()> {
        info!("Recording DNS server removal");
        self.installed.lock().dns_servers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InterfaceSpec {
        InterfaceSpec {
            listen: "127.0.0.1:5353".parse().unwrap(),
            dns_servers: vec!["127.0.0.1".parse().unwrap()],
        }
    }

    #[test]
    fn test_install_and_remove_routes() {
        let network = LoopbackNetwork::new();
        assert_eq!(network.installed(), InstalledState::default());

        network.install_routes(&spec()).unwrap();
        assert_eq!(network.installed().routes, Some(spec()));

        network.remove_routes().unwrap();
        assert!(network.installed().routes.is_none());
    }

    #[test]
    fn test_dns_servers_roundtrip() {
        let network = LoopbackNetwork::new();
        let servers: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap()];

        network.set_dns_servers(&servers).unwrap();
        assert_eq!(network.installed().dns_servers, servers);

        network.clear_dns_servers().unwrap();
        assert!(network.installed().dns_servers.is_empty());
    }
}
