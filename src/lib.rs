//! Workspace entry crate.
//!
//! Re-exports the playback core and, behind the `desktop-shims` feature, the
//! service façade with its desktop defaults. Host applications can depend on
//! `track-player` alone instead of wiring each crate individually.

pub use core_playback as playback;
pub use core_runtime as runtime;

pub use core_playback::{
    AddOptions, ControllerState, LoadOptions, PlaybackController, PlaybackError, PlayerStatus,
    Track, TrackMetadata,
};
pub use core_runtime::config::PlayerConfig;
pub use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};

#[cfg(feature = "desktop-shims")]
pub use core_service::{CacheRegistry, PlayerService, ServiceError};
