//! # Playback Orchestration Module
//!
//! Queue, state machine, backends and media cache of the player.
//!
//! ## Overview
//!
//! This module handles:
//! - An ordered track queue with a current-entry cursor
//! - The playback controller state machine and its command surface
//! - Local (on-device engine) and remote (receiver) playback backends
//! - Handing a running session from one backend to another
//! - A bounded byte-range media cache with least-recently-used eviction

pub mod backend;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod handoff;
pub mod queue;
pub mod track;

pub use backend::{
    BackendConnector, BackendEvent, BackendId, LocalBackend, LocalConnector, PlaybackBackend,
    RemoteBackend, RemoteConnector,
};
pub use cache::{CacheConfig, CacheSpan, CacheStats, CacheStore, CachingDataSourceFactory};
pub use config::{AddOptions, ControllerConfig, LoadOptions};
pub use controller::{ControllerState, PlaybackController, PlaybackControllerBuilder, PlayerStatus};
pub use error::{PlaybackError, Result};
pub use handoff::{HandoffCoordinator, SessionSnapshot};
pub use queue::{Queue, Removal};
pub use track::{QueueEntry, QueueId, Track, TrackMetadata};
