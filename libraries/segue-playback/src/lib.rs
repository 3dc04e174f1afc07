//! Segue Playback
//!
//! Gapless, crossfade-capable dual-slot playback engine.
//!
//! One slot is the session-visible **Master**; the other is a silent
//! **Auxiliary** that pre-buffers the next media so the engine can blend into
//! it without stalls. Roles swap as soon as both slots are audible, so the
//! session layer sees the incoming track immediately while the fade keeps
//! running.
//!
//! # Architecture
//!
//! - [`envelope`]: pure gain curves for the fade
//! - [`focus`]: audio focus arbitration
//! - [`queue`]: per-slot timelines and swap re-parenting
//! - [`orchestrator`]: the single task that owns both slots
//!
//! Platform integrations provide a [`PlaybackEngine`] factory and an
//! [`AudioFocusPlatform`]; media resolution comes from any
//! [`LocatorResolver`](segue_core::LocatorResolver), typically
//! `segue_source::MediaResolver`.
//!
//! # Example
//!
//! ```ignore
//! use segue_playback::{EngineConfig, FadeCurve, Orchestrator, TransitionSettings};
//! use std::time::Duration;
//!
//! let orchestrator = Orchestrator::spawn(EngineConfig::default(), factory, resolver, platform)?;
//! orchestrator.set_queue(entries, 0, Duration::ZERO).await?;
//! orchestrator.play().await?;
//!
//! orchestrator.add_swap_listener(|master| println!("Now playing {:?}", master.media_id));
//! orchestrator.prepare_next(next, Duration::ZERO).await?;
//! orchestrator
//!     .begin_transition(TransitionSettings::symmetric(3000, FadeCurve::EqualPower))
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod focus;
pub mod orchestrator;
pub mod queue;
pub mod slot;
pub mod transition;
pub mod types;

pub use config::EngineConfig;
pub use engine::{EngineFactory, PlaybackEngine};
pub use envelope::{envelope, fade_gains, FadeCurve};
pub use error::{EngineError, PlaybackError, Result, WaitStage};
pub use events::PlaybackEvent;
pub use focus::{
    AudioFocusPlatform, FocusArbiter, FocusChange, FocusDirective, FocusGrant, FocusListener,
    FocusRequestOutcome, FocusState,
};
pub use orchestrator::{ListenerId, Orchestrator, SlotVolumes, SwapListener};
pub use queue::QueueTimeline;
pub use slot::{PlaybackSlot, WaitOutcome};
pub use transition::{TransitionSession, TransitionSettings, MIN_FADE_DURATION};
pub use types::{
    EngineHandle, EngineSnapshot, QueueEntry, RepeatMode, SlotId, SlotRole, SlotState,
    TransitionStatus,
};
