//! Network collaborator seams
//!
//! The gateway never touches the OS directly: route and DNS installation go
//! through [`NetworkCollaborator`], and connectivity changes arrive as
//! [`NetworkState`] events from a platform monitor. Implementations live in
//! the sinkgate-platform crate.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::error::Result;

/// Kind of network interface currently carrying traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// Wi-Fi
    Wifi,
    /// Cellular data
    Cellular,
    /// Wired, virtual or unknown
    Other,
}

/// Snapshot of OS connectivity, delivered by the platform monitor
///
/// Transient by design: states are evaluated and discarded, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    /// Interface type carrying traffic
    pub interface: InterfaceType,
    /// Whether the interface has connectivity
    pub connected: bool,
}

impl NetworkState {
    /// A connected state on the given interface
    pub fn connected(interface: InterfaceType) -> Self {
        Self {
            interface,
            connected: true,
        }
    }

    /// The disconnected state
    pub fn disconnected() -> Self {
        Self {
            interface: InterfaceType::Other,
            connected: false,
        }
    }
}

/// What the gateway asks the OS to point at the local resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    /// Local resolver address routes should target
    pub listen: SocketAddr,
    /// DNS servers to install system-wide
    pub dns_servers: Vec<IpAddr>,
}

/// Route and DNS installation, implemented by the platform layer
///
/// Implementations may block briefly (syscalls, helper invocations); the
/// gateway runs them on a blocking task under its start deadline. Removal
/// operations must be idempotent: the gateway invokes them during cleanup
/// even when nothing is installed.
pub trait NetworkCollaborator: Send + Sync {
    /// Point system routes at the local resolver
    fn install_routes(&self, spec: &InterfaceSpec) -> Result<()>;

    /// Remove previously installed routes
    fn remove_routes(&self) -> Result<()>;

    /// Install system DNS servers
    fn set_dns_servers(&self, servers: &[IpAddr]) -> Result<()>;

    /// Restore the system DNS configuration
    fn clear_dns_servers(&self) -> Result<()>;
}
