//! Media reference resolver

use crate::config::ResolverConfig;
use crate::memo::LocatorMemo;
use async_trait::async_trait;
use segue_core::{
    CacheManager, Connectivity, LocatorResolver, MediaReference, ProtocolProxy, ProxyError,
    RemoteProtocol, ResolutionError, ResolvedLocator, Result,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns opaque media references into playback-ready locators
///
/// Resolution order for remote references:
/// 1. Fully downloaded → local cache path (the proxy is never consulted)
/// 2. Offline → [`ResolutionError::OfflineUnavailable`] plus a one-shot
///    blocked event
/// 3. Online → protocol proxy, waiting for it to start if needed and
///    refreshing the session on authorization failures
///
/// # Example
///
/// ```ignore
/// let resolver = MediaResolver::builder(cache, connectivity)
///     .proxy(RemoteProtocol::CloudDrive, cloud_proxy)
///     .build();
///
/// let locator = resolver.resolve(&reference).await?;
/// ```
pub struct MediaResolver {
    cache: Arc<dyn CacheManager>,
    connectivity: Arc<dyn Connectivity>,
    proxies: HashMap<RemoteProtocol, Arc<dyn ProtocolProxy>>,
    memo: LocatorMemo,
    config: ResolverConfig,
}

/// Builder for [`MediaResolver`]
pub struct MediaResolverBuilder {
    cache: Arc<dyn CacheManager>,
    connectivity: Arc<dyn Connectivity>,
    proxies: HashMap<RemoteProtocol, Arc<dyn ProtocolProxy>>,
    config: ResolverConfig,
}

impl MediaResolverBuilder {
    /// Register the proxy serving a protocol (replaces any previous one)
    #[must_use]
    pub fn proxy(mut self, protocol: RemoteProtocol, proxy: Arc<dyn ProtocolProxy>) -> Self {
        self.proxies.insert(protocol, proxy);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MediaResolver {
        MediaResolver {
            memo: LocatorMemo::new(self.config.memo_capacity, self.config.memo_ttl()),
            cache: self.cache,
            connectivity: self.connectivity,
            proxies: self.proxies,
            config: self.config,
        }
    }
}

impl MediaResolver {
    /// Start building a resolver around the cache and connectivity collaborators
    pub fn builder(
        cache: Arc<dyn CacheManager>,
        connectivity: Arc<dyn Connectivity>,
    ) -> MediaResolverBuilder {
        MediaResolverBuilder {
            cache,
            connectivity,
            proxies: HashMap::new(),
            config: ResolverConfig::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a reference into a locator
    pub async fn resolve(&self, reference: &MediaReference) -> Result<ResolvedLocator> {
        self.resolve_inner(reference, true).await
    }

    /// Whether the reference is known to be fully available locally
    pub fn is_locally_available(&self, reference: &MediaReference) -> bool {
        match reference {
            MediaReference::Local { .. } => true,
            MediaReference::RemoteCached { .. } => self.completed_cache_path(reference).is_some(),
        }
    }

    /// Speculatively resolve neighbouring queue entries
    ///
    /// Warms the memo without committing playback. Failures are logged and
    /// dropped, and the offline-blocked event is never emitted from here.
    pub async fn prefetch(&self, references: &[MediaReference]) -> usize {
        let mut resolved = 0;
        for reference in references {
            match self.resolve_inner(reference, false).await {
                Ok(_) => resolved += 1,
                Err(e) => debug!(media = %reference.media_id(), error = %e, "Prefetch skipped"),
            }
        }
        resolved
    }

    /// Forget a memoized locator (e.g. after the engine failed to open it)
    pub fn invalidate(&self, reference: &MediaReference) {
        self.memo.remove(reference);
    }

    /// Forget all memoized locators
    pub fn clear_memo(&self) {
        self.memo.clear();
    }

    async fn resolve_inner(
        &self,
        reference: &MediaReference,
        announce_offline: bool,
    ) -> Result<ResolvedLocator> {
        let (protocol, id) = match reference {
            MediaReference::Local { path } => {
                debug!(path = %path.display(), "Resolved local file");
                return Ok(ResolvedLocator::local(path));
            }
            MediaReference::RemoteCached { protocol, id, .. } => (*protocol, id),
        };

        // Fast path: never re-stream data that is already on disk
        if let Some(path) = self.completed_cache_path(reference) {
            debug!(%protocol, id = %id, path = %path.display(), "Using completed cache file");
            let length = file_length(&path).await;
            return Ok(ResolvedLocator::local(&path).with_content_length(length));
        }

        if !self.connectivity.is_online() {
            if announce_offline {
                warn!(%protocol, id = %id, "Offline and not downloaded, playback blocked");
                self.connectivity.offline_playback_blocked(reference);
            }
            return Err(ResolutionError::OfflineUnavailable);
        }

        if let Some(locator) = self.memo.get(reference) {
            debug!(%protocol, id = %id, "Using memoized locator");
            return Ok(locator);
        }

        let proxy = self
            .proxies
            .get(&protocol)
            .ok_or(ResolutionError::ProxyNotReady(protocol))?;

        if !proxy.is_ready() {
            let waited = self.config.proxy_ready_timeout();
            debug!(%protocol, timeout_ms = waited.as_millis() as u64, "Waiting for proxy");
            if !proxy.await_ready(waited).await {
                warn!(%protocol, "Proxy did not become ready in time");
                return Err(ResolutionError::Timeout { protocol, waited });
            }
        }

        let proxied = self.request_with_auth_retry(proxy.as_ref(), protocol, reference).await?;

        let content_length = match proxied.content_length {
            Some(length) => Some(length),
            None => self.fallback_length(reference).await,
        };

        let locator = ResolvedLocator::remote(proxied.uri, proxied.supports_range, content_length);
        self.memo.put(reference.clone(), locator.clone());

        info!(%protocol, id = %id, uri = %locator.uri, "Resolved remote media");
        Ok(locator)
    }

    async fn request_with_auth_retry(
        &self,
        proxy: &dyn ProtocolProxy,
        protocol: RemoteProtocol,
        reference: &MediaReference,
    ) -> Result<segue_core::ProxyLocator> {
        let max_attempts = self.config.max_auth_retries + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match proxy.resolve_locator(reference).await {
                Ok(locator) => return Ok(locator),
                Err(ProxyError::Unauthorized) if attempts < max_attempts => {
                    warn!(%protocol, attempt = attempts, "Proxy unauthorized, refreshing session");
                    if let Err(e) = proxy.refresh_session().await {
                        warn!(%protocol, error = %e, "Session refresh failed");
                    }
                }
                Err(ProxyError::Unauthorized) => {
                    return Err(ResolutionError::Unauthorized { protocol, attempts });
                }
                Err(e) => return Err(ResolutionError::Proxy(e)),
            }
        }
    }

    fn completed_cache_path(&self, reference: &MediaReference) -> Option<PathBuf> {
        if self.cache.is_fully_downloaded(reference) {
            self.cache.local_path(reference)
        } else {
            None
        }
    }

    /// Size the proxy could not report: the reference's own size, then the
    /// length of a completed cache file
    async fn fallback_length(&self, reference: &MediaReference) -> Option<u64> {
        if let Some(size) = reference.known_size() {
            return Some(size);
        }

        match self.completed_cache_path(reference) {
            Some(path) => file_length(&path).await,
            None => None,
        }
    }
}

async fn file_length(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|meta| meta.len())
}

#[async_trait]
impl LocatorResolver for MediaResolver {
    async fn resolve(&self, reference: &MediaReference) -> Result<ResolvedLocator> {
        MediaResolver::resolve(self, reference).await
    }

    fn is_locally_available(&self, reference: &MediaReference) -> bool {
        MediaResolver::is_locally_available(self, reference)
    }
}
