/// Core error types for Segue
use crate::types::RemoteProtocol;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a protocol proxy/session collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Session credentials were rejected; refreshing may help
    #[error("Proxy session unauthorized")]
    Unauthorized,

    /// Proxy has not finished starting up
    #[error("Proxy not ready")]
    NotReady,

    /// Remote file is gone or cannot be served
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    /// Transport failure talking to the remote side
    #[error("Network error: {0}")]
    Network(String),
}

/// Failure to turn a media reference into a playable locator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Not downloaded and the device is offline
    #[error("Media is not available offline")]
    OfflineUnavailable,

    /// Proxy did not become ready within the bounded wait
    #[error("{protocol} proxy not ready after {waited:?}")]
    Timeout {
        protocol: RemoteProtocol,
        waited: Duration,
    },

    /// No proxy is registered for the protocol
    #[error("No proxy available for {0}")]
    ProxyNotReady(RemoteProtocol),

    /// Session refresh did not fix authorization
    #[error("{protocol} authorization failed after {attempts} attempts")]
    Unauthorized {
        protocol: RemoteProtocol,
        attempts: u32,
    },

    /// Any other proxy failure
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

/// Result type alias for resolution
pub type Result<T> = std::result::Result<T, ResolutionError>;
