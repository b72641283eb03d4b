//! # Playback Error Types
//!
//! Every rejected command carries one of these. [`PlaybackError::code`] is the
//! stable machine-checkable code handed to the bridge layer; `Display` is the
//! human-readable message.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur during queue and playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Queue Errors
    // ========================================================================
    /// No queue entry carries the requested track id.
    #[error("Track not found in queue: {0}")]
    TrackNotFound(String),

    /// `skip_to_next` at the last entry.
    #[error("There is no next track in the queue")]
    NoNextTrack,

    /// `skip_to_previous` at the first entry.
    #[error("There is no previous track in the queue")]
    NoPreviousTrack,

    /// The command needs a current entry but the queue is empty.
    #[error("The queue is empty")]
    QueueEmpty,

    #[error("Queue index out of range: {index} (length {len})")]
    InvalidIndex { index: usize, len: usize },

    // ========================================================================
    // Load Errors
    // ========================================================================
    /// Decode or network failure reported by the backend.
    #[error("Failed to load track {track_id}: {message}")]
    LoadFailed { track_id: String, message: String },

    /// A newer load superseded this one before it completed.
    #[error("Load of {0} was superseded by a newer load")]
    LoadCancelled(String),

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// Switching backends was aborted; the previous backend is still active.
    #[error("Handoff failed: {0}")]
    HandoffFailed(String),

    /// A transport call on the active backend failed.
    #[error("Backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Best-effort cache I/O failure. Never fatal for playback.
    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    // ========================================================================
    // Argument Errors
    // ========================================================================
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    #[error("Invalid playback rate: {0} (must be finite and greater than 0)")]
    InvalidRate(f32),

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The controller task has shut down.
    #[error("Playback controller is closed")]
    ControllerClosed,
}

impl PlaybackError {
    /// Stable snake_case code for the bridge layer.
    pub fn code(&self) -> &'static str {
        match self {
            PlaybackError::TrackNotFound(_) => "track_not_found",
            PlaybackError::NoNextTrack => "no_next_track",
            PlaybackError::NoPreviousTrack => "no_previous_track",
            PlaybackError::QueueEmpty => "queue_empty",
            PlaybackError::InvalidIndex { .. } => "invalid_index",
            PlaybackError::LoadFailed { .. } => "load_failed",
            PlaybackError::LoadCancelled(_) => "load_cancelled",
            PlaybackError::HandoffFailed(_) => "handoff_failed",
            PlaybackError::Backend(_) => "backend_error",
            PlaybackError::CacheIo(_) => "cache_io",
            PlaybackError::InvalidVolume(_) => "invalid_volume",
            PlaybackError::InvalidRate(_) => "invalid_rate",
            PlaybackError::InvalidTrack(_) => "invalid_track",
            PlaybackError::Config(_) => "invalid_config",
            PlaybackError::ControllerClosed => "controller_closed",
        }
    }

    /// Returns `true` if retrying the same command may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::LoadFailed { .. }
                | PlaybackError::Backend(_)
                | PlaybackError::CacheIo(_)
        )
    }

    /// Returns `true` for queue boundary and lookup failures.
    pub fn is_queue_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::TrackNotFound(_)
                | PlaybackError::NoNextTrack
                | PlaybackError::NoPreviousTrack
                | PlaybackError::QueueEmpty
                | PlaybackError::InvalidIndex { .. }
        )
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(io) => PlaybackError::CacheIo(io.to_string()),
            other => PlaybackError::Backend(other.to_string()),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
