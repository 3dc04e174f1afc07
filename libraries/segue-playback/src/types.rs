//! Core types for the dual-slot engine

use segue_core::{MediaId, MediaReference};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the two physical playback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// The sibling slot
    pub fn other(self) -> Self {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::A => f.write_str("A"),
            SlotId::B => f.write_str("B"),
        }
    }
}

/// Role a slot currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotRole {
    /// Session-visible, externally controllable
    Master,

    /// Silent pre-buffering slot
    Auxiliary,
}

/// Playback state reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlotState {
    /// Nothing loaded
    #[default]
    Idle,

    /// Loading / filling buffers
    Buffering,

    /// Loaded and able to start instantly, not rendering
    Ready,

    /// Audio is actually flowing
    Playing,

    /// Reached end of media
    Ended,

    /// Engine error
    Failed,
}

impl SlotState {
    pub fn is_ready_or_playing(self) -> bool {
        matches!(self, SlotState::Ready | SlotState::Playing)
    }
}

/// Session-attachable identity of a slot
///
/// `generation` increments every time the engine behind the slot is torn
/// down and rebuilt, so a handle taken before a rebuild compares unequal to
/// one taken after.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle {
    pub slot: SlotId,
    pub generation: u64,
    pub media_id: Option<MediaId>,
}

impl EngineHandle {
    /// Same slot and same engine instance (media may differ)
    pub fn same_engine(&self, other: &EngineHandle) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    /// Stop when the queue ends
    #[default]
    Off,

    /// Loop the entire queue
    All,

    /// Loop the current entry only
    One,
}

/// Queue entry owned by a slot's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identity used for swap bookkeeping
    pub id: MediaId,

    /// Where the media lives
    pub reference: MediaReference,

    /// Display title (optional)
    pub title: Option<String>,

    /// Display artist (optional)
    pub artist: Option<String>,

    /// Duration, when known up front
    pub duration: Option<Duration>,
}

impl QueueEntry {
    /// Entry with no display metadata, ID derived from the reference
    pub fn from_reference(reference: MediaReference) -> Self {
        Self {
            id: reference.media_id(),
            reference,
            title: None,
            artist: None,
            duration: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>, artist: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.artist = Some(artist.into());
        self
    }
}

/// Transition state machine status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionStatus {
    /// No transition
    #[default]
    NotRunning,

    /// Auxiliary loaded (or loading) and paused at volume 0
    Preparing,

    /// Both slots audible, swap pending
    Overlapping,

    /// Roles swapped, fade still running
    Swapped,

    /// Tearing down the outgoing slot
    Settling,

    /// Cancelled before completion
    Cancelled,

    /// Preparation or start-up failed
    Failed,
}

impl TransitionStatus {
    /// Whether a transition is in flight (prepared or audible)
    pub fn is_running(self) -> bool {
        matches!(
            self,
            TransitionStatus::Preparing
                | TransitionStatus::Overlapping
                | TransitionStatus::Swapped
                | TransitionStatus::Settling
        )
    }

    /// Whether both slots are audible
    pub fn is_overlapping(self) -> bool {
        matches!(self, TransitionStatus::Overlapping | TransitionStatus::Swapped)
    }
}

/// Consistent view of both slots, published atomically on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub master: EngineHandle,
    pub auxiliary: EngineHandle,
    pub transition: TransitionStatus,
    pub should_play: bool,
}

impl EngineSnapshot {
    /// Role of a slot in this snapshot
    pub fn role_of(&self, slot: SlotId) -> SlotRole {
        if self.master.slot == slot {
            SlotRole::Master
        } else {
            SlotRole::Auxiliary
        }
    }
}
