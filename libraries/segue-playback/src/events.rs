//! Playback Events
//!
//! Broadcast to every subscriber of the orchestrator. Events are emitted at
//! key points:
//! - Auxiliary prepared (or failed to prepare)
//! - Transition started, swapped, completed, aborted or cancelled
//! - Audio focus lost, paused, resumed or denied
//! - Master engine failure and natural end of media
//!
//! Swap listeners are the synchronous path for the session layer; these
//! events are the asynchronous one for UI and logging.

use crate::types::{EngineHandle, SlotId};
use segue_core::MediaId;
use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Auxiliary loaded and parked at volume 0
    Prepared {
        /// Slot holding the prepared media
        slot: SlotId,
        media_id: MediaId,
    },

    /// Auxiliary could not be prepared; Master is untouched
    PrepareFailed { media_id: MediaId, reason: String },

    /// Both slots are audible
    TransitionStarted {
        /// Outgoing media
        from: Option<MediaId>,
        /// Incoming media
        to: MediaId,
        /// Effective fade duration in milliseconds
        duration_ms: u64,
    },

    /// Roles swapped; `master` is the new session-visible slot
    Swapped { master: EngineHandle },

    /// Fade finished and the outgoing engine was rebuilt
    TransitionCompleted { master: EngineHandle },

    /// Transition gave up before swapping; Master restored to full volume
    TransitionAborted { reason: String },

    /// Transition cancelled by the caller or superseded
    TransitionCancelled,

    /// Platform refused focus; playback forced to pause
    FocusDenied,

    /// Focus lost for good; playback stopped
    FocusLost,

    /// Focus lost temporarily; playback paused
    FocusPaused,

    /// Focus regained after a temporary loss
    FocusResumed { auxiliary: bool },

    /// Master engine failed irrecoverably
    MasterFailed {
        master: EngineHandle,
        message: String,
    },

    /// Master reached the end of its media outside a transition
    MediaEnded { media_id: Option<MediaId> },

    /// Master timeline replaced
    QueueChanged {
        /// New queue length
        length: usize,
    },
}

impl PlaybackEvent {
    /// Whether the event signals a problem worth showing to the user
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PlaybackEvent::PrepareFailed { .. }
                | PlaybackEvent::TransitionAborted { .. }
                | PlaybackEvent::FocusDenied
                | PlaybackEvent::MasterFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PlaybackEvent::FocusDenied.is_error());
        assert!(PlaybackEvent::TransitionAborted {
            reason: "timeout".into()
        }
        .is_error());
        assert!(!PlaybackEvent::TransitionCancelled.is_error());
        assert!(!PlaybackEvent::QueueChanged { length: 3 }.is_error());
    }

    #[test]
    fn test_event_serializes_with_variant_name() {
        let event = PlaybackEvent::Prepared {
            slot: SlotId::B,
            media_id: MediaId::new("cloud_drive:42"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Prepared"));
        assert!(json.contains("cloud_drive:42"));
    }
}
