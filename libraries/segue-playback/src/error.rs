//! Error types for playback orchestration

use segue_core::ResolutionError;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an underlying decode/render engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Locator could not be opened or decoded
    #[error("Unplayable media: {0}")]
    Unplayable(String),

    /// Seek target outside the media
    #[error("Invalid seek position: {0:?}")]
    InvalidSeek(Duration),

    /// Engine is unusable
    #[error("Engine failure: {0}")]
    Fatal(String),
}

/// Stage of a transition that has a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Engine accepting a resolved locator
    EngineLoad,

    /// Auxiliary reaching ready-to-play
    AuxiliaryReady,

    /// Auxiliary confirming that audio is flowing
    AuxiliaryPlaying,
}

/// Playback errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// Media reference could not be resolved
    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Engine could not load the resolved locator
    #[error("Load failed: {0}")]
    Load(EngineError),

    /// Auxiliary never reached the expected state in time
    #[error("Timed out after {waited:?} waiting for {stage:?}")]
    ReadinessTimeout { stage: WaitStage, waited: Duration },

    /// Platform refused audio focus
    #[error("Audio focus denied")]
    FocusDenied,

    /// The Master engine failed irrecoverably
    #[error("Master engine failed: {0}")]
    EngineFatal(String),

    /// `begin_transition` without prepared Auxiliary media
    #[error("No media prepared on the auxiliary slot")]
    NoPreparedMedia,

    /// Superseded by a newer request or an explicit cancel
    #[error("Transition cancelled")]
    Cancelled,

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The orchestrator task is gone
    #[error("Orchestrator has shut down")]
    Shutdown,
}

impl PlaybackError {
    /// Only a failed Master is fatal; everything else leaves playback audible
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlaybackError::EngineFatal(_))
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
