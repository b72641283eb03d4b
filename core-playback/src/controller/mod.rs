//! # Playback Controller
//!
//! The single authoritative playback state machine. A background task owns the
//! queue and the active backend; [`PlaybackController`] is a cheap cloneable
//! handle that sends it commands. Every mutating command resolves or rejects
//! exactly once.
//!
//! ## State machine
//!
//! ```text
//! Idle ──load──> Loading ──prepared──> Ready ──play──> Playing
//!                   ▲                    ▲               │
//!                   │ skip / error       └─── pause ─────┤
//!                   │ auto-advance            Paused <───┘
//!                   │
//!                Failed <── backend error (any state)
//!                Ended  <── stop / end of queue
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let controller = PlaybackController::builder(Arc::new(LocalConnector::new(engines)))
//!     .events(bus.clone())
//!     .start()
//!     .await?;
//!
//! controller.add(vec![Track::new("t1", "https://cdn/t1.mp3")], AddOptions::default()).await?;
//! controller.play().await?;
//! ```

mod actor;
pub mod state;

pub use state::{ControllerState, PlayerStatus};

use crate::backend::{BackendConnector, PlaybackBackend};
use crate::config::{AddOptions, ControllerConfig, LoadOptions};
use crate::error::{PlaybackError, Result};
use crate::track::{QueueEntry, Track, TrackMetadata};
use actor::{Command, ControllerActor, Reply};
use bridge_traits::AudioFocus;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument};

/// Configures and starts a [`PlaybackController`].
pub struct PlaybackControllerBuilder {
    connector: Arc<dyn BackendConnector>,
    config: ControllerConfig,
    audio_focus: Option<Arc<dyn AudioFocus>>,
    events: Option<EventBus>,
}

impl PlaybackControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn audio_focus(mut self, focus: Arc<dyn AudioFocus>) -> Self {
        self.audio_focus = Some(focus);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Connect the initial backend and spawn the control task on the current
    /// tokio runtime.
    #[instrument(skip(self), fields(backend = %self.connector.describe()))]
    pub async fn start(self) -> Result<PlaybackController> {
        self.config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(DEFAULT_EVENT_BUFFER_SIZE));
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let backend: Box<dyn PlaybackBackend> = self.connector.connect(backend_tx.clone()).await?;
        backend.set_volume(self.config.initial_volume).await?;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer);
        let actor = ControllerActor::new(
            self.config,
            backend,
            backend_tx,
            self.audio_focus,
            events.clone(),
        );
        tokio::spawn(actor.run(command_rx, backend_rx));

        info!("Playback controller spawned");
        Ok(PlaybackController {
            commands: command_tx,
            events,
        })
    }
}

/// Handle to a running playback controller.
#[derive(Clone)]
pub struct PlaybackController {
    commands: mpsc::Sender<Command>,
    events: EventBus,
}

impl PlaybackController {
    pub fn builder(connector: Arc<dyn BackendConnector>) -> PlaybackControllerBuilder {
        PlaybackControllerBuilder {
            connector,
            config: ControllerConfig::default(),
            audio_focus: None,
            events: None,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.stream()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| PlaybackError::ControllerClosed)?;
        rx.await.map_err(|_| PlaybackError::ControllerClosed)?
    }

    async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| PlaybackError::ControllerClosed)?;
        rx.await.map_err(|_| PlaybackError::ControllerClosed)
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Insert `tracks` and return the index of the first one. Adding to an
    /// empty queue starts loading the first track.
    pub async fn add(&self, tracks: Vec<Track>, options: AddOptions) -> Result<usize> {
        self.request(|reply| Command::Add {
            tracks,
            options,
            reply,
        })
        .await
    }

    /// Remove every entry with one of `ids`. Returns the removed indices;
    /// unknown ids are ignored.
    pub async fn remove<S: Into<String>>(&self, ids: Vec<S>) -> Result<Vec<usize>> {
        let ids = ids.into_iter().map(Into::into).collect();
        self.request(|reply| Command::Remove { ids, reply }).await
    }

    /// Drop every entry after the current one.
    pub async fn remove_upcoming(&self) -> Result<usize> {
        self.request(|reply| Command::RemoveUpcoming { reply }).await
    }

    /// Drop every entry before the current one. The current track keeps playing.
    pub async fn remove_previous(&self) -> Result<usize> {
        self.request(|reply| Command::RemovePrevious { reply }).await
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        self.request(|reply| Command::MoveTrack { from, to, reply })
            .await
    }

    pub async fn skip(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::Skip { id, reply }).await
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        self.request(|reply| Command::SkipToNext { reply }).await
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        self.request(|reply| Command::SkipToPrevious { reply }).await
    }

    pub async fn update_metadata(&self, id: impl Into<String>, metadata: TrackMetadata) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::UpdateMetadata {
            id,
            metadata,
            reply,
        })
        .await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.request(|reply| Command::SeekTo { position_ms, reply })
            .await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        self.request(|reply| Command::SetRate { rate, reply }).await
    }

    /// Stop playback and clear the queue.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Replace the current entry with `track` and load it.
    ///
    /// Resolves once the track is prepared. Rejects with
    /// [`PlaybackError::LoadFailed`] on a backend error and with
    /// [`PlaybackError::LoadCancelled`] when a newer load supersedes it.
    pub async fn load(&self, track: Track, options: LoadOptions) -> Result<()> {
        self.request(|reply| Command::Load {
            track,
            options,
            reply,
        })
        .await
    }

    /// Move the session to a backend built by `connector`. On failure the
    /// current backend stays active and nothing changes.
    pub async fn handoff(&self, connector: Arc<dyn BackendConnector>) -> Result<()> {
        self.request(|reply| Command::Handoff { connector, reply })
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn status(&self) -> Result<PlayerStatus> {
        self.query(|reply| Command::Status { reply }).await
    }

    pub async fn queue(&self) -> Result<Vec<QueueEntry>> {
        self.query(|reply| Command::Queue { reply }).await
    }

    pub async fn state(&self) -> Result<ControllerState> {
        Ok(self.status().await?.state)
    }

    pub async fn current_track(&self) -> Result<Option<Track>> {
        Ok(self.status().await?.current_track)
    }

    pub async fn position_ms(&self) -> Result<u64> {
        Ok(self.status().await?.position_ms)
    }

    pub async fn buffered_position_ms(&self) -> Result<u64> {
        Ok(self.status().await?.buffered_position_ms)
    }

    pub async fn duration_ms(&self) -> Result<Option<u64>> {
        Ok(self.status().await?.duration_ms)
    }

    pub async fn volume(&self) -> Result<f32> {
        Ok(self.status().await?.volume)
    }

    pub async fn rate(&self) -> Result<f32> {
        Ok(self.status().await?.rate)
    }

    pub async fn is_remote(&self) -> Result<bool> {
        Ok(self.status().await?.is_remote)
    }

    /// Stop playback, destroy the backend and end the control task.
    pub async fn shutdown(&self) -> Result<()> {
        self.query(|reply| Command::Shutdown { reply }).await
    }
}
