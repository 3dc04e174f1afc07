//! Playback slot: one replaceable engine plus its bookkeeping

use crate::engine::{EngineFactory, PlaybackEngine};
use crate::error::EngineError;
use crate::queue::QueueTimeline;
use crate::types::{EngineHandle, QueueEntry, SlotId, SlotState};
use segue_core::ResolvedLocator;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of a bounded wait on a slot's lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
    Cancelled,
    /// Engine reported `Failed` or went away
    Failed,
}

/// One of the two slots owned by the orchestrator
///
/// The slot identity is permanent; the engine behind it is not. After each
/// transition the outgoing engine is released and replaced, and the
/// generation counter moves on.
pub struct PlaybackSlot {
    id: SlotId,
    engine: Box<dyn PlaybackEngine>,
    pub(crate) status: watch::Receiver<SlotState>,
    generation: u64,
    loaded: Option<QueueEntry>,
    pub(crate) timeline: QueueTimeline,
    volume: f32,
}

impl PlaybackSlot {
    pub fn new(id: SlotId, factory: &dyn EngineFactory) -> Self {
        let engine = factory.create(id);
        let status = engine.status();
        Self {
            id,
            engine,
            status,
            generation: 0,
            loaded: None,
            timeline: QueueTimeline::default(),
            volume: 0.0,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            slot: self.id,
            generation: self.generation,
            media_id: self.loaded.as_ref().map(|entry| entry.id.clone()),
        }
    }

    /// Entry currently loaded into the engine
    pub fn loaded(&self) -> Option<&QueueEntry> {
        self.loaded.as_ref()
    }

    pub fn has_media(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn state(&self) -> SlotState {
        *self.status.borrow()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn timeline(&self) -> &QueueTimeline {
        &self.timeline
    }

    pub async fn load(
        &mut self,
        entry: QueueEntry,
        locator: &ResolvedLocator,
        start: Duration,
    ) -> Result<(), EngineError> {
        debug!(slot = %self.id, media = %entry.id, start_ms = start.as_millis() as u64, "Loading");
        self.engine.load(locator, start).await?;
        self.loaded = Some(entry);
        Ok(())
    }

    pub async fn play(&mut self) -> Result<(), EngineError> {
        self.engine.play().await
    }

    pub async fn pause(&mut self) -> Result<(), EngineError> {
        self.engine.pause().await
    }

    pub async fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        self.engine.seek(position).await
    }

    /// Stop and drop loaded media
    pub async fn stop_and_clear(&mut self) -> Result<(), EngineError> {
        self.loaded = None;
        self.engine.stop().await?;
        self.engine.clear().await
    }

    /// Clamp to [0, 1] and apply
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume = volume;
        self.engine.set_volume(volume);
    }

    pub fn set_pause_at_end(&mut self, enabled: bool) {
        self.engine.set_pause_at_end(enabled);
    }

    pub fn position(&self) -> Duration {
        self.engine.position()
    }

    /// Wait until the engine can start instantly (or already plays)
    pub async fn wait_until_ready(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.wait_for(timeout, cancel, SlotState::is_ready_or_playing)
            .await
    }

    /// Wait until audio is actually flowing
    pub async fn wait_until_playing(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.wait_for(timeout, cancel, |state| state == SlotState::Playing)
            .await
    }

    async fn wait_for(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
        accept: impl Fn(SlotState) -> bool + Send + Sync,
    ) -> WaitOutcome {
        let mut status = self.status.clone();
        let reached = async {
            status
                .wait_for(|state| accept(*state) || *state == SlotState::Failed)
                .await
                .map(|state| *state)
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => WaitOutcome::Cancelled,
            result = tokio::time::timeout(timeout, reached) => match result {
                Err(_) => WaitOutcome::TimedOut,
                Ok(Ok(SlotState::Failed) | Err(_)) => WaitOutcome::Failed,
                Ok(Ok(_)) => WaitOutcome::Reached,
            },
        }
    }

    /// Replace the engine with a fresh instance
    ///
    /// The old engine is released, the generation moves on and the new
    /// engine starts silent.
    pub async fn rebuild(&mut self, factory: &dyn EngineFactory) {
        self.engine.release().await;
        self.engine = factory.create(self.id);
        self.status = self.engine.status();
        self.generation += 1;
        self.loaded = None;
        self.set_volume(0.0);
        debug!(slot = %self.id, generation = self.generation, "Engine rebuilt");
    }

    pub async fn release(&mut self) {
        self.loaded = None;
        self.engine.release().await;
    }
}
