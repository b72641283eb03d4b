//! # Playback Backends
//!
//! A backend drives exactly one playback technology: the on-device engine
//! ([`LocalBackend`]) or a remote receiver ([`RemoteBackend`]). The controller
//! holds one `Box<dyn PlaybackBackend>` at a time and only swaps it through a
//! handoff.
//!
//! ## Asynchronous completions
//!
//! Engines and receivers report progress on their own threads. Each backend
//! installs an [`EventRelay`] as their listener; the relay drops notifications
//! whose token is not the backend's current load generation, updates the
//! backend's status cell and forwards a [`BackendEvent`] into the controller's
//! channel. Nothing on an engine thread touches controller state.

pub mod local;
pub mod remote;

pub use local::{LocalBackend, LocalConnector};
pub use remote::{RemoteBackend, RemoteConnector};

use crate::error::Result;
use crate::track::Track;
use bridge_traits::platform::PlatformSendSync;
use bridge_traits::{EngineEvent, EngineEventKind, EngineListener, PlaybackState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Identity of one backend instance. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(Uuid);

impl BackendId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackendId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An engine notification on its way into the control sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    pub backend: BackendId,
    pub generation: u64,
    pub kind: EngineEventKind,
}

pub type BackendEventSender = mpsc::UnboundedSender<BackendEvent>;
pub type BackendEventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Capability set shared by local and remote backends.
///
/// `load` returns once the request is accepted; preparation completes later
/// through a [`BackendEvent`] carrying the same `generation`. A newer `load`
/// supersedes an outstanding one.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait PlaybackBackend: PlatformSendSync {
    fn id(&self) -> BackendId;

    fn is_remote(&self) -> bool;

    /// Receiver name for remote backends.
    fn device_name(&self) -> Option<String> {
        None
    }

    async fn load(&self, track: &Track, generation: u64) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek_to(&self, position_ms: u64) -> Result<()>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn set_rate(&self, rate: f32) -> Result<()>;

    fn state(&self) -> PlaybackState;

    fn position_ms(&self) -> u64;

    fn buffered_position_ms(&self) -> u64;

    fn duration_ms(&self) -> Option<u64>;

    fn volume(&self) -> f32;

    fn rate(&self) -> f32;

    fn can_change_volume(&self) -> bool {
        true
    }

    /// Give the backend the whole queue ahead of a load.
    async fn set_queue_hint(&self, _tracks: &[Track], _current: Option<usize>) -> Result<()> {
        Ok(())
    }

    /// Release everything. The backend is not used afterwards.
    async fn destroy(&self) -> Result<()>;
}

/// Builds backends for the controller and for handoffs.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait BackendConnector: PlatformSendSync {
    /// Short description for logs and errors.
    fn describe(&self) -> String;

    async fn connect(&self, events: BackendEventSender) -> Result<Box<dyn PlaybackBackend>>;
}

// ============================================================================
// Status cell
// ============================================================================

/// Last known transport status of a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendStatus {
    pub state: PlaybackState,
    /// Generation of the outstanding load. `0` means none.
    pub generation: u64,
    pub duration_ms: Option<u64>,
    pub volume: f32,
    pub rate: f32,
    playing: bool,
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self {
            state: PlaybackState::None,
            generation: 0,
            duration_ms: None,
            volume: 1.0,
            rate: 1.0,
            playing: false,
        }
    }
}

impl BackendStatus {
    fn resumed_state(&self) -> PlaybackState {
        if self.playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Ready
        }
    }

    fn apply(&mut self, kind: &EngineEventKind) {
        match kind {
            EngineEventKind::Prepared { duration_ms } => {
                self.state = PlaybackState::Ready;
                self.duration_ms = duration_ms.or(self.duration_ms);
            }
            EngineEventKind::Buffering => self.state = PlaybackState::Buffering,
            EngineEventKind::Ready | EngineEventKind::SeekCompleted { .. } => {
                if self.state == PlaybackState::Buffering {
                    self.state = self.resumed_state();
                }
            }
            EngineEventKind::Ended => {
                self.state = PlaybackState::Stopped;
                self.playing = false;
            }
            EngineEventKind::Error { .. } => {
                self.state = PlaybackState::Error;
                self.playing = false;
            }
        }
    }
}

/// Status shared between a backend and its relay.
#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    inner: Mutex<BackendStatus>,
}

impl StatusCell {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            inner: Mutex::new(BackendStatus {
                volume,
                ..BackendStatus::default()
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> BackendStatus {
        *self.inner.lock()
    }

    pub(crate) fn begin_load(&self, generation: u64, duration_hint_ms: Option<u64>) {
        let mut status = self.inner.lock();
        status.generation = generation;
        status.state = PlaybackState::Buffering;
        status.duration_ms = duration_hint_ms;
        status.playing = false;
    }

    pub(crate) fn fail_load(&self) {
        let mut status = self.inner.lock();
        status.state = PlaybackState::Error;
        status.playing = false;
    }

    /// Drop the outstanding load so its late notifications are ignored.
    pub(crate) fn invalidate(&self) {
        let mut status = self.inner.lock();
        status.generation = 0;
        status.state = PlaybackState::Stopped;
        status.playing = false;
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        let mut status = self.inner.lock();
        status.playing = playing;
        if matches!(status.state, PlaybackState::Ready | PlaybackState::Playing) {
            status.state = status.resumed_state();
        }
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.inner.lock().volume = volume;
    }

    pub(crate) fn set_rate(&self, rate: f32) {
        self.inner.lock().rate = rate;
    }

    /// Apply `event` if it belongs to the outstanding load.
    fn accept(&self, event: &EngineEvent) -> bool {
        let mut status = self.inner.lock();
        if status.generation == 0 || event.token != status.generation {
            return false;
        }
        status.apply(&event.kind);
        true
    }
}

/// Listener installed on an engine or receiver.
pub(crate) struct EventRelay {
    backend: BackendId,
    status: Arc<StatusCell>,
    events: BackendEventSender,
}

impl EventRelay {
    pub(crate) fn new(
        backend: BackendId,
        status: Arc<StatusCell>,
        events: BackendEventSender,
    ) -> Self {
        Self {
            backend,
            status,
            events,
        }
    }
}

impl EngineListener for EventRelay {
    fn on_event(&self, event: EngineEvent) {
        if !self.status.accept(&event) {
            trace!(backend = %self.backend, token = event.token, "Dropping stale engine event");
            return;
        }
        self.events
            .send(BackendEvent {
                backend: self.backend,
                generation: event.token,
                kind: event.kind,
            })
            .ok();
    }
}
