//! # Controller Configuration
//!
//! Settings of the playback controller, and the per-command option structs
//! validated before a command reaches the control sequence.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};

/// Playback controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Move on to the next entry after a load or decode error.
    ///
    /// Default: true.
    #[serde(default = "default_auto_advance_on_error")]
    pub auto_advance_on_error: bool,

    /// Volume applied to every backend the controller attaches.
    ///
    /// Default: 1.0.
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Capacity of the command channel. Senders wait when it is full.
    ///
    /// Default: 64.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auto_advance_on_error: default_auto_advance_on_error(),
            initial_volume: default_initial_volume(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlaybackError::InvalidVolume(self.initial_volume));
        }

        if self.command_buffer == 0 {
            return Err(PlaybackError::Config(
                "command_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_auto_advance_on_error() -> bool {
    true
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_command_buffer() -> usize {
    64
}

// ============================================================================
// Command Options
// ============================================================================

/// Options of [`add`](crate::PlaybackController::add).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOptions {
    /// Insert before the first entry with this track id. Appends when unset.
    #[serde(default)]
    pub before_id: Option<String>,
}

impl AddOptions {
    pub fn before(id: impl Into<String>) -> Self {
        Self {
            before_id: Some(id.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.before_id {
            if id.trim().is_empty() {
                return Err(PlaybackError::Config("before_id is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Options of [`load`](crate::PlaybackController::load).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Start playing as soon as the track is prepared.
    #[serde(default)]
    pub play_when_ready: bool,

    /// Seek here once prepared.
    #[serde(default)]
    pub start_position_ms: Option<u64>,
}

impl LoadOptions {
    pub fn playing() -> Self {
        Self {
            play_when_ready: true,
            ..Default::default()
        }
    }

    pub fn with_start_position_ms(mut self, position_ms: u64) -> Self {
        self.start_position_ms = Some(position_ms);
        self
    }
}
