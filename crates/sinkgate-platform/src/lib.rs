//! Sinkgate Platform Layer
//!
//! Implementations of the core network collaborator seams.
//!
//! ## Provided
//!
//! - **LoopbackNetwork**: records route/DNS requests without touching the
//!   OS, used for local runs and tests
//! - **ConnectivityMonitor**: probe-based watcher feeding `NetworkState`
//!   transitions to the on-demand evaluator
//!
//! OS-specific route tables and resolver configuration plug in behind the
//! same `NetworkCollaborator` trait from sinkgate-core.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub use error::{PlatformError, Result};

mod loopback;
pub use loopback::{InstalledState, LoopbackNetwork};

mod monitor;
pub use monitor::ConnectivityMonitor;
