//! Platform-specific errors

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Route table manipulation failed
    #[error("Route operation failed: {0}")]
    RouteOperation(String),

    /// System DNS configuration could not be changed
    #[error("DNS configuration failed: {0}")]
    DnsConfiguration(String),

    /// Connectivity probe failed
    #[error("Probe error: {0}")]
    ProbeError(String),

    /// Insufficient privileges for a system change
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PlatformError> for sinkgate_core::Error {
    fn from(e: PlatformError) -> Self {
        sinkgate_core::Error::RouteInstall(e.to_string())
    }
}

/// Platform result type
pub type Result<T> = std::result::Result<T, PlatformError>;
