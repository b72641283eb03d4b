//! Media engine bridge traits and the value types exchanged with them.
//!
//! The core never decodes or renders media itself. Hosts plug in a
//! [`MediaEngine`] (on-device decode/render pipeline) that accepts a
//! [`MediaRequest`], reports asynchronous progress through an
//! [`EngineListener`] and answers position queries. Every asynchronous
//! notification carries the `token` that was passed to
//! [`MediaEngine::prepare`] so stale completions can be told apart from
//! current ones.

use crate::{
    error::Result,
    platform::PlatformSendSync,
    storage::DataSourceFactory,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Container/streaming format of a media URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Progressive file (mp3, aac, flac, ...).
    #[default]
    Default,
    Dash,
    Hls,
    SmoothStreaming,
}

impl MediaType {
    /// Whether the format is an adaptive manifest rather than a single file.
    pub fn is_adaptive(&self) -> bool {
        !matches!(self, MediaType::Default)
    }
}

/// Display metadata forwarded to engines and receivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDescription {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Everything an engine or receiver needs to open one item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    /// Caller supplied identifier of the item.
    pub item_id: String,
    pub uri: String,
    pub media_type: MediaType,
    /// Extra HTTP headers for network fetches.
    pub headers: HashMap<String, String>,
    pub description: MediaDescription,
}

impl MediaRequest {
    pub fn new(item_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            uri: uri.into(),
            media_type: MediaType::Default,
            headers: HashMap::new(),
            description: MediaDescription::default(),
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: MediaDescription) -> Self {
        self.description = description;
        self
    }
}

/// Listener-facing playback state of a single backend.
///
/// `None` is the state before anything was loaded. `Stopped` and `Error`
/// end the current load only; a new load starts again from `Buffering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    None,
    Buffering,
    /// Loaded and paused.
    Ready,
    Playing,
    Stopped,
    Error,
}

impl PlaybackState {
    /// Whether the current load has finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Error)
    }
}

/// Asynchronous notification kinds raised by engines and receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    /// The item is decoded far enough to start rendering.
    Prepared { duration_ms: Option<u64> },
    /// Rendering stalled waiting for data.
    Buffering,
    /// Enough data is buffered again after a stall.
    Ready,
    /// A previously issued seek has landed.
    SeekCompleted { position_ms: u64 },
    /// The item played through to its end.
    Ended,
    /// Decode or network failure. The engine does not retry.
    Error { message: String },
}

/// One notification tagged with the token of the load it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub token: u64,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(token: u64, kind: EngineEventKind) -> Self {
        Self { token, kind }
    }
}

/// Receives engine notifications.
///
/// Called from whatever thread the host engine uses for callbacks, so
/// implementations must not block.
pub trait EngineListener: PlatformSendSync {
    fn on_event(&self, event: EngineEvent);
}

/// On-device decode/render pipeline.
///
/// A call to [`prepare`](MediaEngine::prepare) returns once the request is
/// accepted; completion is reported through the registered listener with the
/// same token. A newer `prepare` supersedes any older one.
///
/// # Example
///
/// ```ignore
/// engine.set_listener(listener);
/// engine.prepare(MediaRequest::new("t1", "https://cdn/t1.mp3"), 1).await?;
/// // ... listener receives EngineEvent { token: 1, kind: Prepared { .. } }
/// engine.play().await?;
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait MediaEngine: PlatformSendSync {
    /// Register the sink for asynchronous notifications. Replaces any previous one.
    fn set_listener(&self, listener: Arc<dyn EngineListener>);

    /// Route network reads through `factory`. Engines that fetch on their
    /// own may ignore this.
    fn use_data_source(&self, _factory: Arc<dyn DataSourceFactory>) {}

    async fn prepare(&self, request: MediaRequest, token: u64) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn set_rate(&self, rate: f32) -> Result<()>;

    fn position_ms(&self) -> u64;

    fn buffered_position_ms(&self) -> u64;

    fn duration_ms(&self) -> Option<u64>;

    /// Free decoder and output resources. The engine is not used afterwards.
    async fn release(&self) -> Result<()>;
}

/// Creates a fresh engine for every local backend instance.
pub trait MediaEngineFactory: PlatformSendSync {
    fn create_engine(&self) -> Result<Arc<dyn MediaEngine>>;
}

/// Host audio-focus arbitration for on-device output.
pub trait AudioFocus: PlatformSendSync {
    /// Ask for output focus. `false` means another app holds it.
    fn request_focus(&self) -> bool;

    fn abandon_focus(&self);
}
