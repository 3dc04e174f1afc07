//! Shared test utilities: a synthetic engine whose readiness and playing
//! signals either fire immediately or never, a static resolver and a
//! scriptable focus platform.

#![allow(dead_code)]

use async_trait::async_trait;
use segue_core::{LocatorResolver, MediaId, MediaReference, ResolutionError, ResolvedLocator};
use segue_playback::{
    AudioFocusPlatform, EngineConfig, EngineError, EngineFactory, EngineHandle, FocusGrant,
    Orchestrator, PlaybackEngine, QueueEntry, SlotId, SlotState,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// SYNTHETIC ENGINE
// ============================================================================

/// When a lifecycle signal fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Immediate,
    Never,
}

#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub ready: Signal,
    pub playing: Signal,
    pub load_fails: bool,
    /// `load` never returns
    pub load_hangs: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            ready: Signal::Immediate,
            playing: Signal::Immediate,
            load_fails: false,
            load_hangs: false,
        }
    }
}

/// What a synthetic engine has been asked to do
#[derive(Debug, Default)]
pub struct EngineLog {
    pub volume: f32,
    pub pause_at_end: bool,
    pub loaded: Option<String>,
    pub plays: usize,
    pub pauses: usize,
    pub released: bool,
}

/// Test-side view of one engine instance
#[derive(Clone)]
pub struct EngineControl {
    status: Arc<watch::Sender<SlotState>>,
    log: Arc<Mutex<EngineLog>>,
}

impl EngineControl {
    pub fn state(&self) -> SlotState {
        *self.status.borrow()
    }

    pub fn volume(&self) -> f32 {
        self.log.lock().unwrap().volume
    }

    pub fn pause_at_end(&self) -> bool {
        self.log.lock().unwrap().pause_at_end
    }

    pub fn loaded(&self) -> Option<String> {
        self.log.lock().unwrap().loaded.clone()
    }

    pub fn plays(&self) -> usize {
        self.log.lock().unwrap().plays
    }

    pub fn pauses(&self) -> usize {
        self.log.lock().unwrap().pauses
    }

    pub fn released(&self) -> bool {
        self.log.lock().unwrap().released
    }

    /// Simulate a decoder crash
    pub fn fail(&self) {
        self.status.send_replace(SlotState::Failed);
    }

    /// Simulate reaching the end of media
    pub fn end(&self) {
        self.status.send_replace(SlotState::Ended);
    }
}

pub struct SyntheticEngine {
    behavior: Behavior,
    control: EngineControl,
    position: Duration,
}

impl SyntheticEngine {
    fn set_state(&self, state: SlotState) {
        self.control.status.send_replace(state);
    }

    fn log(&self) -> std::sync::MutexGuard<'_, EngineLog> {
        self.control.log.lock().unwrap()
    }
}

#[async_trait]
impl PlaybackEngine for SyntheticEngine {
    async fn load(
        &mut self,
        locator: &ResolvedLocator,
        start: Duration,
    ) -> Result<(), EngineError> {
        if self.behavior.load_hangs {
            std::future::pending::<()>().await;
        }
        if self.behavior.load_fails {
            self.set_state(SlotState::Failed);
            return Err(EngineError::Unplayable(locator.uri.clone()));
        }
        self.log().loaded = Some(locator.uri.clone());
        self.position = start;
        self.set_state(match self.behavior.ready {
            Signal::Immediate => SlotState::Ready,
            Signal::Never => SlotState::Buffering,
        });
        Ok(())
    }

    async fn play(&mut self) -> Result<(), EngineError> {
        self.log().plays += 1;
        if self.control.state() == SlotState::Ready && self.behavior.playing == Signal::Immediate
        {
            self.set_state(SlotState::Playing);
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), EngineError> {
        self.log().pauses += 1;
        if self.control.state() == SlotState::Playing {
            self.set_state(SlotState::Ready);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.set_state(SlotState::Idle);
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), EngineError> {
        self.log().loaded = None;
        self.set_state(SlotState::Idle);
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        if self.log().loaded.is_none() {
            return Err(EngineError::InvalidSeek(position));
        }
        self.position = position;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.log().volume = volume;
    }

    fn set_pause_at_end(&mut self, enabled: bool) {
        self.log().pause_at_end = enabled;
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn status(&self) -> watch::Receiver<SlotState> {
        self.control.status.subscribe()
    }

    async fn release(&mut self) {
        self.log().released = true;
    }
}

/// Factory that records every engine it builds
#[derive(Default)]
pub struct SyntheticFactory {
    behaviors: Mutex<HashMap<SlotId, Behavior>>,
    engines: Mutex<Vec<(SlotId, EngineControl)>>,
}

impl SyntheticFactory {
    /// Behavior for engines built for `slot` from now on
    pub fn set_behavior(&self, slot: SlotId, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(slot, behavior);
    }

    /// Most recently built engine for `slot`
    pub fn engine(&self, slot: SlotId) -> EngineControl {
        self.engines
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == slot)
            .map(|(_, control)| control.clone())
            .expect("no engine built for slot")
    }

    /// Every engine built for `slot`, oldest first
    pub fn engines(&self, slot: SlotId) -> Vec<EngineControl> {
        self.engines
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == slot)
            .map(|(_, control)| control.clone())
            .collect()
    }

    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl EngineFactory for SyntheticFactory {
    fn create(&self, slot: SlotId) -> Box<dyn PlaybackEngine> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&slot)
            .copied()
            .unwrap_or_default();
        let (status, _) = watch::channel(SlotState::Idle);
        let control = EngineControl {
            status: Arc::new(status),
            log: Arc::new(Mutex::new(EngineLog::default())),
        };
        self.engines.lock().unwrap().push((slot, control.clone()));
        Box::new(SyntheticEngine {
            behavior,
            control,
            position: Duration::ZERO,
        })
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Resolves local references to their path; selected IDs fail offline or
/// take a while
#[derive(Default)]
pub struct StaticResolver {
    unavailable: Mutex<HashSet<MediaId>>,
    delays: Mutex<HashMap<MediaId, Duration>>,
}

impl StaticResolver {
    pub fn make_slow(&self, reference: &MediaReference, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(reference.media_id(), delay);
    }

    pub fn make_unavailable(&self, reference: &MediaReference) {
        self.unavailable
            .lock()
            .unwrap()
            .insert(reference.media_id());
    }
}

#[async_trait]
impl LocatorResolver for StaticResolver {
    async fn resolve(
        &self,
        reference: &MediaReference,
    ) -> segue_core::Result<ResolvedLocator> {
        let delay = self.delays.lock().unwrap().get(&reference.media_id()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.lock().unwrap().contains(&reference.media_id()) {
            return Err(ResolutionError::OfflineUnavailable);
        }
        Ok(match reference {
            MediaReference::Local { path } => ResolvedLocator::local(path),
            MediaReference::RemoteCached { .. } => ResolvedLocator::remote(
                format!("http://127.0.0.1:9000/{}", reference.media_id()),
                true,
                reference.known_size(),
            ),
        })
    }

    fn is_locally_available(&self, reference: &MediaReference) -> bool {
        reference.is_local()
    }
}

// ============================================================================
// FOCUS PLATFORM
// ============================================================================

#[derive(Clone)]
pub struct FakeFocus {
    pub grant: Arc<AtomicBool>,
    pub requests: Arc<AtomicUsize>,
    pub abandons: Arc<AtomicUsize>,
}

impl Default for FakeFocus {
    fn default() -> Self {
        Self {
            grant: Arc::new(AtomicBool::new(true)),
            requests: Arc::new(AtomicUsize::new(0)),
            abandons: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AudioFocusPlatform for FakeFocus {
    fn request_focus(&mut self, _owner: &EngineHandle) -> FocusGrant {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.grant.load(Ordering::SeqCst) {
            FocusGrant::Granted
        } else {
            FocusGrant::Denied
        }
    }

    fn abandon_focus(&mut self, _owner: &EngineHandle) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub factory: Arc<SyntheticFactory>,
    pub resolver: Arc<StaticResolver>,
    pub focus: FakeFocus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(EngineConfig::default(), |_| {})
    }

    /// Harness with custom config; `setup` runs before any engine is built
    pub fn with(config: EngineConfig, setup: impl FnOnce(&SyntheticFactory)) -> Self {
        let factory = Arc::new(SyntheticFactory::default());
        setup(&factory);
        let resolver = Arc::new(StaticResolver::default());
        let focus = FakeFocus::default();

        let orchestrator = Orchestrator::spawn(
            config,
            Arc::clone(&factory) as Arc<dyn EngineFactory>,
            Arc::clone(&resolver) as Arc<dyn LocatorResolver>,
            Box::new(focus.clone()),
        )
        .unwrap();

        Self {
            orchestrator,
            factory,
            resolver,
            focus,
        }
    }

    /// Queue `names`, start at `index` and play
    pub async fn playing(&self, names: &[&str], index: usize) {
        let entries = names.iter().map(|name| entry(name)).collect();
        self.orchestrator
            .set_queue(entries, index, Duration::ZERO)
            .await
            .unwrap();
        self.orchestrator.play().await.unwrap();
    }

    pub fn master_engine(&self) -> EngineControl {
        self.factory
            .engine(self.orchestrator.master_handle().slot)
    }

    pub fn aux_engine(&self) -> EngineControl {
        self.factory
            .engine(self.orchestrator.snapshot().auxiliary.slot)
    }
}

pub fn track(name: &str) -> MediaReference {
    MediaReference::local(format!("/music/{name}.flac"))
}

pub fn entry(name: &str) -> QueueEntry {
    QueueEntry::from_reference(track(name)).with_title(name.to_uppercase(), "Artist")
}

/// Let the orchestrator task drain pending messages without advancing
/// the fade clock by a full tick
pub async fn settle_messages() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
