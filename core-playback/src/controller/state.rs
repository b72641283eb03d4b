//! Controller state machine states and status snapshots.

use crate::track::Track;
use bridge_traits::PlaybackState;
use serde::{Deserialize, Serialize};

/// Logical state of the controller, independent of which backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Nothing loaded.
    #[default]
    Idle,
    Loading,
    /// Prepared and not yet started.
    Ready,
    Playing,
    Paused,
    Ended,
    Failed,
}

impl ControllerState {
    /// State reported to listeners.
    pub fn playback_state(&self) -> PlaybackState {
        match self {
            ControllerState::Idle => PlaybackState::None,
            ControllerState::Loading => PlaybackState::Buffering,
            ControllerState::Ready | ControllerState::Paused => PlaybackState::Ready,
            ControllerState::Playing => PlaybackState::Playing,
            ControllerState::Ended => PlaybackState::Stopped,
            ControllerState::Failed => PlaybackState::Error,
        }
    }

    /// A track is loaded and can be started without reloading.
    pub fn is_loaded(&self) -> bool {
        matches!(
            self,
            ControllerState::Ready | ControllerState::Playing | ControllerState::Paused
        )
    }
}

/// Point-in-time view of the controller for queries.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: ControllerState,
    pub current_track: Option<Track>,
    pub current_index: Option<usize>,
    pub queue_length: usize,
    pub position_ms: u64,
    pub buffered_position_ms: u64,
    pub duration_ms: Option<u64>,
    pub volume: f32,
    pub rate: f32,
    pub is_remote: bool,
    pub device_name: Option<String>,
}

impl PlayerStatus {
    pub fn playback_state(&self) -> PlaybackState {
        self.state.playback_state()
    }
}
