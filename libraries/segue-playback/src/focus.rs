//! Audio focus arbitration
//!
//! Decides who may produce sound. The arbiter holds focus on behalf of the
//! current Master and turns platform focus changes into directives that the
//! orchestrator applies to both slots.
//!
//! Platform callbacks never touch orchestrator state directly: they go
//! through a [`FocusListener`], which is just a channel into the
//! orchestrator task.

use crate::types::EngineHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Platform answer to a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGrant {
    Granted,
    Denied,
}

/// External focus change delivered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChange {
    /// Focus (re)gained
    Gain,

    /// Temporary loss (e.g. a notification sound)
    LossTransient,

    /// Permanent loss (another player took over)
    Loss,
}

/// What the orchestrator must do after a focus change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDirective {
    /// Nothing to do
    None,

    /// Both slots stop wanting to play
    StopAll,

    /// Both slots pause, resume expected
    PauseAll,

    /// Master resumes; Auxiliary too when a transition is audibly overlapping
    Resume { auxiliary: bool },
}

/// Outcome of a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestOutcome {
    AlreadyHeld,
    Granted,
    Denied,
}

impl FocusRequestOutcome {
    pub fn is_denied(self) -> bool {
        self == FocusRequestOutcome::Denied
    }
}

/// Focus bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub held: bool,
    pub paused_by_focus_loss: bool,
}

/// Platform audio focus API
#[cfg_attr(test, mockall::automock)]
pub trait AudioFocusPlatform: Send {
    fn request_focus(&mut self, owner: &EngineHandle) -> FocusGrant;

    fn abandon_focus(&mut self, owner: &EngineHandle);
}

/// Clonable sink for platform focus callbacks
#[derive(Debug, Clone)]
pub struct FocusListener {
    tx: mpsc::UnboundedSender<FocusChange>,
}

impl FocusListener {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<FocusChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forward a platform focus change
    ///
    /// Returns `false` once the orchestrator has shut down.
    pub fn notify(&self, change: FocusChange) -> bool {
        self.tx.send(change).is_ok()
    }
}

/// Focus state machine
pub struct FocusArbiter {
    state: FocusState,
    owner: Option<EngineHandle>,
    platform: Box<dyn AudioFocusPlatform>,
}

impl FocusArbiter {
    pub fn new(platform: Box<dyn AudioFocusPlatform>) -> Self {
        Self {
            state: FocusState::default(),
            owner: None,
            platform,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn is_paused_by_focus_loss(&self) -> bool {
        self.state.paused_by_focus_loss
    }

    /// Request focus for `owner`; a no-op while focus is held
    pub fn request_focus(&mut self, owner: &EngineHandle) -> FocusRequestOutcome {
        if self.state.held {
            return FocusRequestOutcome::AlreadyHeld;
        }

        self.owner = Some(owner.clone());
        match self.platform.request_focus(owner) {
            FocusGrant::Granted => {
                debug!(slot = %owner.slot, "Audio focus granted");
                self.state.held = true;
                FocusRequestOutcome::Granted
            }
            FocusGrant::Denied => {
                warn!(slot = %owner.slot, "Audio focus denied");
                self.state.held = false;
                FocusRequestOutcome::Denied
            }
        }
    }

    /// Master's should-play intent changed
    ///
    /// Focus is requested lazily on the first `true`. Either way the user
    /// has taken over, so any pending focus-loss resume is forgotten; a
    /// `false` also abandons focus.
    pub fn on_should_play(
        &mut self,
        should_play: bool,
        owner: &EngineHandle,
    ) -> Option<FocusRequestOutcome> {
        if should_play {
            let outcome = self.request_focus(owner);
            if !outcome.is_denied() {
                self.state.paused_by_focus_loss = false;
            }
            return Some(outcome);
        }

        self.state.paused_by_focus_loss = false;
        self.abandon();
        None
    }

    /// Platform focus change
    ///
    /// `overlapping` tells whether both slots are currently audible.
    pub fn on_change(&mut self, change: FocusChange, overlapping: bool) -> FocusDirective {
        match change {
            FocusChange::Loss => {
                debug!("Audio focus lost");
                // Ownership is gone: the next request must reach the platform
                self.state.paused_by_focus_loss = false;
                self.state.held = false;
                FocusDirective::StopAll
            }
            FocusChange::LossTransient => {
                debug!("Audio focus lost transiently");
                self.state.paused_by_focus_loss = true;
                FocusDirective::PauseAll
            }
            FocusChange::Gain => {
                if self.state.paused_by_focus_loss {
                    debug!(overlapping, "Audio focus regained, resuming");
                    self.state.paused_by_focus_loss = false;
                    self.state.held = true;
                    FocusDirective::Resume {
                        auxiliary: overlapping,
                    }
                } else {
                    FocusDirective::None
                }
            }
        }
    }

    /// Move focus ownership to a new Master identity
    ///
    /// Called during a slot swap. Focus is re-requested under the new
    /// identity only when playback should continue.
    pub fn transfer(
        &mut self,
        new_owner: &EngineHandle,
        should_play: bool,
    ) -> Option<FocusRequestOutcome> {
        if self.state.paused_by_focus_loss {
            // Keep the pending resume; only the identity changes
            self.owner = Some(new_owner.clone());
            return None;
        }

        self.abandon();
        self.owner = Some(new_owner.clone());

        if should_play {
            Some(self.request_focus(new_owner))
        } else {
            None
        }
    }

    /// Give focus back to the platform
    pub fn abandon(&mut self) {
        if !self.state.held {
            return;
        }
        if let Some(owner) = &self.owner {
            self.platform.abandon_focus(owner);
        }
        self.state.held = false;
    }
}
