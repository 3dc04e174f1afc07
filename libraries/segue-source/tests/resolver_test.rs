//! Media resolver tests
//!
//! Collaborators are mocked with mockall so every test can assert exactly
//! which ones were consulted (e.g. the proxy must never be touched when a
//! completed download exists).

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::always;
use segue_core::{
    CacheManager, Connectivity, MediaReference, ProtocolProxy, ProxyError, ProxyLocator,
    RemoteProtocol,
};
use segue_source::{MediaResolver, ResolutionError, ResolverConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCKS
// ============================================================================

mock! {
    pub Cache {}
    impl CacheManager for Cache {
        fn is_fully_downloaded(&self, reference: &MediaReference) -> bool;
        fn local_path(&self, reference: &MediaReference) -> Option<PathBuf>;
    }
}

mock! {
    pub Network {}
    impl Connectivity for Network {
        fn is_online(&self) -> bool;
        fn offline_playback_blocked(&self, reference: &MediaReference);
    }
}

mock! {
    pub Proxy {}
    #[async_trait]
    impl ProtocolProxy for Proxy {
        fn is_ready(&self) -> bool;
        async fn await_ready(&self, timeout: Duration) -> bool;
        async fn resolve_locator(
            &self,
            reference: &MediaReference,
        ) -> Result<ProxyLocator, ProxyError>;
        async fn refresh_session(&self) -> Result<(), ProxyError>;
    }
}

fn cloud_ref(id: &str) -> MediaReference {
    MediaReference::remote(RemoteProtocol::CloudDrive, id)
}

fn not_downloaded() -> MockCache {
    let mut cache = MockCache::new();
    cache.expect_is_fully_downloaded().return_const(false);
    cache.expect_local_path().return_const(None);
    cache
}

fn online() -> MockNetwork {
    let mut network = MockNetwork::new();
    network.expect_is_online().return_const(true);
    network.expect_offline_playback_blocked().never();
    network
}

fn proxy_locator(uri: &str, length: Option<u64>) -> ProxyLocator {
    ProxyLocator {
        uri: uri.to_string(),
        supports_range: true,
        content_length: length,
    }
}

fn resolver(cache: MockCache, network: MockNetwork, proxy: MockProxy) -> MediaResolver {
    MediaResolver::builder(Arc::new(cache), Arc::new(network))
        .proxy(RemoteProtocol::CloudDrive, Arc::new(proxy))
        .build()
}

// ============================================================================
// LOCAL AND CACHED
// ============================================================================

#[tokio::test]
async fn test_local_reference_returns_path_directly() {
    // No expectations: any collaborator call would panic
    let resolver = resolver(MockCache::new(), MockNetwork::new(), MockProxy::new());

    let locator = resolver
        .resolve(&MediaReference::local("/music/song.flac"))
        .await
        .unwrap();

    assert_eq!(locator.uri, "/music/song.flac");
    assert!(locator.local_file);
    assert!(locator.random_access);
}

#[tokio::test]
async fn test_fully_downloaded_uses_cache_path_and_skips_proxy() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 2048]).unwrap();
    let cached_path = file.path().to_path_buf();

    let mut cache = MockCache::new();
    cache.expect_is_fully_downloaded().return_const(true);
    cache
        .expect_local_path()
        .return_const(Some(cached_path.clone()));

    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().never();
    proxy.expect_resolve_locator().never();

    let resolver = resolver(cache, MockNetwork::new(), proxy);
    let locator = resolver.resolve(&cloud_ref("song")).await.unwrap();

    assert_eq!(locator.uri, cached_path.to_string_lossy());
    assert!(locator.local_file);
    assert_eq!(locator.content_length, Some(2048));
    assert!(resolver.is_locally_available(&cloud_ref("song")));
}

// ============================================================================
// OFFLINE
// ============================================================================

#[tokio::test]
async fn test_offline_not_downloaded_fires_blocked_event_once() {
    let mut network = MockNetwork::new();
    network.expect_is_online().return_const(false);
    network
        .expect_offline_playback_blocked()
        .with(always())
        .times(1)
        .return_const(());

    let mut proxy = MockProxy::new();
    proxy.expect_resolve_locator().never();

    let resolver = resolver(not_downloaded(), network, proxy);
    let result = resolver.resolve(&cloud_ref("song")).await;

    assert_eq!(result.unwrap_err(), ResolutionError::OfflineUnavailable);
}

#[tokio::test]
async fn test_prefetch_offline_stays_silent() {
    let mut network = MockNetwork::new();
    network.expect_is_online().return_const(false);
    network.expect_offline_playback_blocked().never();

    let resolver = resolver(not_downloaded(), network, MockProxy::new());
    let resolved = resolver
        .prefetch(&[cloud_ref("a"), cloud_ref("b")])
        .await;

    assert_eq!(resolved, 0);
}

// ============================================================================
// PROXY
// ============================================================================

#[tokio::test]
async fn test_online_resolves_through_proxy() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(1)
        .returning(|_| Ok(proxy_locator("http://127.0.0.1:9000/song", Some(4096))));

    let resolver = resolver(not_downloaded(), online(), proxy);
    let locator = resolver.resolve(&cloud_ref("song")).await.unwrap();

    assert_eq!(locator.uri, "http://127.0.0.1:9000/song");
    assert!(!locator.local_file);
    assert!(locator.random_access);
    assert_eq!(locator.content_length, Some(4096));
}

#[tokio::test]
async fn test_waits_for_proxy_startup() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(false);
    proxy
        .expect_await_ready()
        .withf(|timeout| *timeout == Duration::from_secs(5))
        .times(1)
        .return_const(true);
    proxy
        .expect_resolve_locator()
        .returning(|_| Ok(proxy_locator("http://proxy/song", None)));

    let resolver = resolver(not_downloaded(), online(), proxy);
    assert!(resolver.resolve(&cloud_ref("song")).await.is_ok());
}

#[tokio::test]
async fn test_proxy_startup_timeout() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(false);
    proxy.expect_await_ready().return_const(false);
    proxy.expect_resolve_locator().never();

    let resolver = resolver(not_downloaded(), online(), proxy);
    let err = resolver.resolve(&cloud_ref("song")).await.unwrap_err();

    assert_eq!(
        err,
        ResolutionError::Timeout {
            protocol: RemoteProtocol::CloudDrive,
            waited: Duration::from_secs(5),
        }
    );
}

#[tokio::test]
async fn test_missing_proxy_is_not_ready() {
    let resolver = MediaResolver::builder(Arc::new(not_downloaded()), Arc::new(online())).build();

    let err = resolver
        .resolve(&MediaReference::remote(RemoteProtocol::ImAttachment, "m1"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ResolutionError::ProxyNotReady(RemoteProtocol::ImAttachment)
    );
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_retries() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);

    let mut calls = 0;
    proxy.expect_resolve_locator().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Err(ProxyError::Unauthorized)
        } else {
            Ok(proxy_locator("http://proxy/song", Some(10)))
        }
    });
    proxy.expect_refresh_session().times(1).returning(|| Ok(()));

    let resolver = resolver(not_downloaded(), online(), proxy);
    let locator = resolver.resolve(&cloud_ref("song")).await.unwrap();

    assert_eq!(locator.uri, "http://proxy/song");
}

#[tokio::test]
async fn test_unauthorized_retry_is_bounded() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(3)
        .returning(|_| Err(ProxyError::Unauthorized));
    proxy.expect_refresh_session().times(2).returning(|| Ok(()));

    let resolver = resolver(not_downloaded(), online(), proxy);
    let err = resolver.resolve(&cloud_ref("song")).await.unwrap_err();

    assert_eq!(
        err,
        ResolutionError::Unauthorized {
            protocol: RemoteProtocol::CloudDrive,
            attempts: 3,
        }
    );
}

#[tokio::test]
async fn test_other_proxy_errors_are_not_retried() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(1)
        .returning(|_| Err(ProxyError::Unavailable("deleted".into())));
    proxy.expect_refresh_session().never();

    let resolver = resolver(not_downloaded(), online(), proxy);
    let err = resolver.resolve(&cloud_ref("song")).await.unwrap_err();

    assert_eq!(
        err,
        ResolutionError::Proxy(ProxyError::Unavailable("deleted".into()))
    );
}

#[tokio::test]
async fn test_unknown_proxy_size_falls_back_to_known_size() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .returning(|_| Ok(proxy_locator("http://proxy/song", None)));

    let resolver = resolver(not_downloaded(), online(), proxy);
    let locator = resolver
        .resolve(&cloud_ref("song").with_known_size(777))
        .await
        .unwrap();

    assert_eq!(locator.content_length, Some(777));
}

// ============================================================================
// MEMO
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_memo_avoids_repeat_proxy_calls_until_ttl() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(2)
        .returning(|_| Ok(proxy_locator("http://proxy/song", Some(1))));

    let resolver = MediaResolver::builder(Arc::new(not_downloaded()), Arc::new(online()))
        .proxy(RemoteProtocol::CloudDrive, Arc::new(proxy))
        .config(ResolverConfig {
            memo_ttl_ms: 1000,
            ..Default::default()
        })
        .build();

    let reference = cloud_ref("song");
    resolver.resolve(&reference).await.unwrap();
    resolver.resolve(&reference).await.unwrap();

    tokio::time::advance(Duration::from_millis(1500)).await;

    // Expired: goes back to the proxy (second and final expected call)
    resolver.resolve(&reference).await.unwrap();
}

#[tokio::test]
async fn test_completed_download_beats_memo() {
    let mut cache = MockCache::new();
    let mut downloaded = false;
    cache.expect_is_fully_downloaded().returning(move |_| {
        // First call: still streaming; afterwards: completed
        let done = downloaded;
        downloaded = true;
        done
    });
    cache
        .expect_local_path()
        .return_const(Some(PathBuf::from("/cache/song.m4a")));

    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(1)
        .returning(|_| Ok(proxy_locator("http://proxy/song", Some(1))));

    let resolver = resolver(cache, online(), proxy);
    let first = resolver.resolve(&cloud_ref("song")).await.unwrap();
    let second = resolver.resolve(&cloud_ref("song")).await.unwrap();

    assert!(!first.local_file);
    assert!(second.local_file);
    assert_eq!(second.uri, "/cache/song.m4a");
}

#[tokio::test]
async fn test_invalidate_forces_fresh_proxy_request() {
    let mut proxy = MockProxy::new();
    proxy.expect_is_ready().return_const(true);
    proxy
        .expect_resolve_locator()
        .times(3)
        .returning(|_| Ok(proxy_locator("http://proxy/song", Some(1))));

    let resolver = resolver(not_downloaded(), online(), proxy);
    let reference = cloud_ref("song");

    resolver.resolve(&reference).await.unwrap();
    resolver.invalidate(&reference);
    resolver.resolve(&reference).await.unwrap();
    resolver.clear_memo();
    resolver.resolve(&reference).await.unwrap();
}
