//! Underlying decode/render engine abstraction
//!
//! Platform crates implement [`PlaybackEngine`] over their native player and
//! hand the orchestrator an [`EngineFactory`]. The orchestrator never reuses
//! an engine after a transition; it asks the factory for a fresh one.

use crate::error::EngineError;
use crate::types::{SlotId, SlotState};
use async_trait::async_trait;
use segue_core::ResolvedLocator;
use std::time::Duration;
use tokio::sync::watch;

/// One decode/render engine instance
///
/// Lifecycle changes are published through [`status`](Self::status) so the
/// orchestrator can await `Ready`/`Playing` without polling.
#[async_trait]
pub trait PlaybackEngine: Send {
    /// Open a locator and prime it at `start`, leaving playback paused
    async fn load(&mut self, locator: &ResolvedLocator, start: Duration)
        -> Result<(), EngineError>;

    async fn play(&mut self) -> Result<(), EngineError>;

    async fn pause(&mut self) -> Result<(), EngineError>;

    async fn stop(&mut self) -> Result<(), EngineError>;

    /// Drop loaded media and return to `Idle`
    async fn clear(&mut self) -> Result<(), EngineError>;

    async fn seek(&mut self, position: Duration) -> Result<(), EngineError>;

    /// Output gain in [0, 1]
    fn set_volume(&mut self, volume: f32);

    /// Auto-pause when the current media item ends
    fn set_pause_at_end(&mut self, enabled: bool);

    fn position(&self) -> Duration;

    /// Lifecycle signal (ready, playing, ended, failed)
    fn status(&self) -> watch::Receiver<SlotState>;

    /// Tear the engine down; it is not used again afterwards
    async fn release(&mut self);
}

/// Produces a fresh engine per slot (re)build
pub trait EngineFactory: Send + Sync {
    fn create(&self, slot: SlotId) -> Box<dyn PlaybackEngine>;
}
