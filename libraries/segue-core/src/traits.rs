/// Collaborator traits for Segue
///
/// Everything the engine consumes from the outside world (download cache,
/// connectivity, remote protocol proxies) is expressed here so the resolver
/// and the orchestrator stay platform-agnostic.
use crate::error::{ProxyError, Result};
use crate::types::{MediaReference, ProxyLocator, ResolvedLocator};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Download/cache manager
pub trait CacheManager: Send + Sync {
    /// Whether the remote media has been completely downloaded
    fn is_fully_downloaded(&self, reference: &MediaReference) -> bool;

    /// Local path of the cached file, complete or not
    fn local_path(&self, reference: &MediaReference) -> Option<PathBuf>;
}

/// Online/offline signal
pub trait Connectivity: Send + Sync {
    /// Whether the device can currently reach remote sources
    fn is_online(&self) -> bool;

    /// One-shot "offline playback blocked" event for the UI layer
    fn offline_playback_blocked(&self, reference: &MediaReference);
}

/// Protocol-specific proxy/session that serves remote bytes
///
/// One instance per [`RemoteProtocol`](crate::types::RemoteProtocol).
#[async_trait]
pub trait ProtocolProxy: Send + Sync {
    /// Whether the proxy has finished starting up
    fn is_ready(&self) -> bool;

    /// Wait up to `timeout` for the proxy to become ready
    ///
    /// Returns `false` if it did not become ready in time.
    async fn await_ready(&self, timeout: Duration) -> bool;

    /// Produce a playable locator for a remote reference
    async fn resolve_locator(
        &self,
        reference: &MediaReference,
    ) -> std::result::Result<ProxyLocator, ProxyError>;

    /// Refresh the session after an authorization failure
    async fn refresh_session(&self) -> std::result::Result<(), ProxyError> {
        Ok(())
    }
}

/// Turns media references into playback-ready locators
///
/// Implemented by the media resolver; consumed by the playback orchestrator.
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    /// Resolve a reference into a locator
    ///
    /// Must be safe to call speculatively: no playback is committed.
    async fn resolve(&self, reference: &MediaReference) -> Result<ResolvedLocator>;

    /// Whether the reference is known to be fully available locally
    fn is_locally_available(&self, reference: &MediaReference) -> bool;
}
