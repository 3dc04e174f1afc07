//! Simulated collaborators
//!
//! Stand-ins for a real decoder, download cache, network and platform
//! focus service, so the engine can be exercised from a terminal.

use crate::config::SimulationSettings;
use async_trait::async_trait;
use segue_core::{
    CacheManager, Connectivity, MediaReference, ProtocolProxy, ProxyError, ProxyLocator,
    ResolvedLocator,
};
use segue_playback::{
    AudioFocusPlatform, EngineError, EngineFactory, EngineHandle, FocusGrant, PlaybackEngine,
    SlotId, SlotState,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Engine that "plays" by advancing a clock
///
/// Buffering and start-up take the configured latencies, reported through
/// the status channel exactly like a real decoder would.
pub struct SimulatedEngine {
    slot: SlotId,
    serial: u64,
    status: Arc<watch::Sender<SlotState>>,
    settings: SimulationSettings,
    uri: Option<String>,
    offset: Duration,
    playing_since: Option<Instant>,
    loading: Option<JoinHandle<()>>,
    starting: Option<JoinHandle<()>>,
}

impl SimulatedEngine {
    fn new(slot: SlotId, serial: u64, settings: SimulationSettings) -> Self {
        let (status, _) = watch::channel(SlotState::Idle);
        Self {
            slot,
            serial,
            status: Arc::new(status),
            settings,
            uri: None,
            offset: Duration::ZERO,
            playing_since: None,
            loading: None,
            starting: None,
        }
    }

    fn set_state(&self, state: SlotState) {
        self.status.send_replace(state);
    }

    fn abort_start(&mut self) {
        if let Some(task) = self.starting.take() {
            task.abort();
        }
    }

    fn abort_all(&mut self) {
        self.abort_start();
        if let Some(task) = self.loading.take() {
            task.abort();
        }
    }

    fn freeze_clock(&mut self) {
        if let Some(since) = self.playing_since.take() {
            self.offset += since.elapsed();
        }
    }
}

/// Move `status` from `from` to `to`, unless something else changed it first
fn advance(status: &watch::Sender<SlotState>, from: SlotState, to: SlotState) {
    status.send_if_modified(|state| {
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    });
}

#[async_trait]
impl PlaybackEngine for SimulatedEngine {
    async fn load(&mut self, locator: &ResolvedLocator, start: Duration) -> Result<(), EngineError> {
        if locator.uri.is_empty() {
            return Err(EngineError::Unplayable("empty locator".to_string()));
        }
        debug!(slot = %self.slot, engine = self.serial, uri = %locator.uri, "Simulated load");

        self.abort_all();
        self.uri = Some(locator.uri.clone());
        self.offset = start;
        self.playing_since = None;
        self.set_state(SlotState::Buffering);

        let status = Arc::clone(&self.status);
        let latency = Duration::from_millis(self.settings.load_latency_ms);
        self.loading = Some(tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            advance(&status, SlotState::Buffering, SlotState::Ready);
        }));
        Ok(())
    }

    async fn play(&mut self) -> Result<(), EngineError> {
        let state = *self.status.borrow();
        let starting = self.starting.as_ref().is_some_and(|task| !task.is_finished());
        if self.uri.is_none() || state == SlotState::Playing || starting {
            return Ok(());
        }
        self.playing_since = Some(Instant::now());

        // A buffering engine starts as soon as it is ready
        let mut ready = self.status.subscribe();
        let status = Arc::clone(&self.status);
        let latency = Duration::from_millis(self.settings.start_latency_ms);
        self.starting = Some(tokio::spawn(async move {
            if ready.wait_for(|state| *state == SlotState::Ready).await.is_err() {
                return;
            }
            tokio::time::sleep(latency).await;
            advance(&status, SlotState::Ready, SlotState::Playing);
        }));
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), EngineError> {
        self.abort_start();
        self.freeze_clock();
        advance(&self.status, SlotState::Playing, SlotState::Ready);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.abort_all();
        self.freeze_clock();
        self.set_state(SlotState::Idle);
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), EngineError> {
        self.uri = None;
        self.offset = Duration::ZERO;
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        if self.uri.is_none() {
            return Err(EngineError::InvalidSeek(position));
        }
        self.offset = position;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        debug!(slot = %self.slot, engine = self.serial, volume, "Simulated volume");
    }

    fn set_pause_at_end(&mut self, enabled: bool) {
        debug!(slot = %self.slot, engine = self.serial, enabled, "Simulated pause-at-end");
    }

    fn position(&self) -> Duration {
        self.offset
            + self
                .playing_since
                .map_or(Duration::ZERO, |since| since.elapsed())
    }

    fn status(&self) -> watch::Receiver<SlotState> {
        self.status.subscribe()
    }

    async fn release(&mut self) {
        self.abort_all();
        debug!(slot = %self.slot, engine = self.serial, "Simulated engine released");
    }
}

/// Builds [`SimulatedEngine`]s, numbering each instance
pub struct SimulatedFactory {
    settings: SimulationSettings,
    built: AtomicU64,
}

impl SimulatedFactory {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            built: AtomicU64::new(0),
        }
    }
}

impl EngineFactory for SimulatedFactory {
    fn create(&self, slot: SlotId) -> Box<dyn PlaybackEngine> {
        let serial = self.built.fetch_add(1, Ordering::Relaxed);
        Box::new(SimulatedEngine::new(slot, serial, self.settings.clone()))
    }
}

/// Cache that has nothing downloaded yet
pub struct EmptyCache {
    root: PathBuf,
}

impl EmptyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CacheManager for EmptyCache {
    fn is_fully_downloaded(&self, _reference: &MediaReference) -> bool {
        false
    }

    fn local_path(&self, reference: &MediaReference) -> Option<PathBuf> {
        Some(self.root.join(reference.media_id().as_str().replace(':', "_")))
    }
}

/// Fixed online/offline state
pub struct StaticConnectivity {
    online: bool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self { online }
    }
}

impl Connectivity for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online
    }

    fn offline_playback_blocked(&self, reference: &MediaReference) {
        info!(media = %reference.media_id(), "Offline: playback blocked");
    }
}

/// Proxy that serves every remote reference from a loopback address
pub struct LoopbackProxy {
    port: u16,
}

impl LoopbackProxy {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ProtocolProxy for LoopbackProxy {
    fn is_ready(&self) -> bool {
        true
    }

    async fn await_ready(&self, _timeout: Duration) -> bool {
        true
    }

    async fn resolve_locator(
        &self,
        reference: &MediaReference,
    ) -> Result<ProxyLocator, ProxyError> {
        Ok(ProxyLocator {
            uri: format!("http://127.0.0.1:{}/{}", self.port, reference.media_id()),
            supports_range: true,
            content_length: reference.known_size(),
        })
    }
}

/// Focus service that always grants
pub struct ConsoleFocus;

impl AudioFocusPlatform for ConsoleFocus {
    fn request_focus(&mut self, owner: &EngineHandle) -> FocusGrant {
        info!(slot = %owner.slot, "Focus requested");
        FocusGrant::Granted
    }

    fn abandon_focus(&mut self, owner: &EngineHandle) {
        info!(slot = %owner.slot, "Focus abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SimulationSettings {
        SimulationSettings {
            load_latency_ms: 100,
            start_latency_ms: 20,
            online: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_reports_lifecycle() {
        let mut engine = SimulatedEngine::new(SlotId::A, 0, settings());
        let mut status = engine.status();

        engine
            .load(&ResolvedLocator::remote("http://x/1", true, None), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(*status.borrow_and_update(), SlotState::Buffering);

        status.wait_for(|state| *state == SlotState::Ready).await.unwrap();
        engine.play().await.unwrap();
        status.wait_for(|state| *state == SlotState::Playing).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        engine.pause().await.unwrap();
        assert_eq!(*status.borrow(), SlotState::Ready);
        let position = engine.position();
        assert!(position >= Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.position(), position);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_supersedes_pending_ready() {
        let mut engine = SimulatedEngine::new(SlotId::B, 1, settings());
        engine
            .load(&ResolvedLocator::remote("http://x/2", true, None), Duration::ZERO)
            .await
            .unwrap();
        engine.stop().await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*engine.status().borrow(), SlotState::Idle);
    }

    #[tokio::test]
    async fn test_loopback_proxy_uses_media_id() {
        let proxy = LoopbackProxy::new(8123);
        let reference =
            MediaReference::remote(segue_core::RemoteProtocol::CloudDrive, "abc").with_known_size(9);

        let locator = proxy.resolve_locator(&reference).await.unwrap();
        assert_eq!(locator.uri, "http://127.0.0.1:8123/cloud_drive:abc");
        assert_eq!(locator.content_length, Some(9));
    }
}
