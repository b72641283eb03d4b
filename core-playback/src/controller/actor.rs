//! The control sequence: one task owning the queue and the active backend.
//!
//! Commands and backend events are handled strictly one at a time. Backend
//! events are drained before the next command so a command always sees the
//! effects of every completion delivered before it was sent.

use super::state::{ControllerState, PlayerStatus};
use crate::backend::{
    BackendConnector, BackendEvent, BackendEventReceiver, BackendEventSender, PlaybackBackend,
};
use crate::config::{AddOptions, ControllerConfig, LoadOptions};
use crate::error::{PlaybackError, Result};
use crate::handoff::{HandoffCoordinator, SessionSnapshot};
use crate::queue::Queue;
use crate::track::{QueueEntry, Track, TrackMetadata};
use bridge_traits::{AudioFocus, EngineEventKind, PlaybackState};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, QueueEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Add {
        tracks: Vec<Track>,
        options: AddOptions,
        reply: Reply<usize>,
    },
    Remove {
        ids: Vec<String>,
        reply: Reply<Vec<usize>>,
    },
    RemoveUpcoming {
        reply: Reply<usize>,
    },
    RemovePrevious {
        reply: Reply<usize>,
    },
    MoveTrack {
        from: usize,
        to: usize,
        reply: Reply<()>,
    },
    Skip {
        id: String,
        reply: Reply<()>,
    },
    SkipToNext {
        reply: Reply<()>,
    },
    SkipToPrevious {
        reply: Reply<()>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    SeekTo {
        position_ms: u64,
        reply: Reply<()>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<()>,
    },
    SetRate {
        rate: f32,
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
    Load {
        track: Track,
        options: LoadOptions,
        reply: Reply<()>,
    },
    UpdateMetadata {
        id: String,
        metadata: TrackMetadata,
        reply: Reply<()>,
    },
    Handoff {
        connector: Arc<dyn BackendConnector>,
        reply: Reply<()>,
    },
    Status {
        reply: oneshot::Sender<PlayerStatus>,
    },
    Queue {
        reply: oneshot::Sender<Vec<QueueEntry>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A `load` command waiting for its track to be prepared.
struct PendingLoad {
    generation: u64,
    track_id: String,
    start_position_ms: Option<u64>,
    reply: Reply<()>,
}

pub(crate) struct ControllerActor {
    config: ControllerConfig,
    queue: Queue,
    backend: Box<dyn PlaybackBackend>,
    backend_tx: BackendEventSender,
    state: ControllerState,
    /// Logical play intent, carried across loads and skips.
    play_when_ready: bool,
    generation: u64,
    pending_load: Option<PendingLoad>,
    seeking: bool,
    volume: f32,
    rate: f32,
    audio_focus: Option<Arc<dyn AudioFocus>>,
    events: EventBus,
}

impl ControllerActor {
    pub(crate) fn new(
        config: ControllerConfig,
        backend: Box<dyn PlaybackBackend>,
        backend_tx: BackendEventSender,
        audio_focus: Option<Arc<dyn AudioFocus>>,
        events: EventBus,
    ) -> Self {
        Self {
            volume: config.initial_volume,
            config,
            queue: Queue::new(),
            backend,
            backend_tx,
            state: ControllerState::Idle,
            play_when_ready: false,
            generation: 0,
            pending_load: None,
            seeking: false,
            rate: 1.0,
            audio_focus,
            events,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut backend_events: BackendEventReceiver,
    ) {
        info!(backend = %self.backend.id(), "Playback controller started");

        loop {
            tokio::select! {
                biased;

                Some(event) = backend_events.recv() => self.handle_backend_event(event).await,

                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        reply.send(()).ok();
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }

        info!("Playback controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Add {
                tracks,
                options,
                reply,
            } => {
                reply.send(self.add(tracks, options).await).ok();
            }
            Command::Remove { ids, reply } => {
                reply.send(self.remove(ids).await).ok();
            }
            Command::RemoveUpcoming { reply } => {
                let dropped = self.queue.remove_upcoming();
                if dropped > 0 {
                    self.emit_queue_changed();
                }
                reply.send(Ok(dropped)).ok();
            }
            Command::RemovePrevious { reply } => {
                let dropped = self.queue.remove_previous();
                if dropped > 0 {
                    self.emit_queue_changed();
                }
                reply.send(Ok(dropped)).ok();
            }
            Command::MoveTrack { from, to, reply } => {
                let result = self.queue.move_entry(from, to);
                if result.is_ok() && from != to {
                    self.emit_queue_changed();
                }
                reply.send(result).ok();
            }
            Command::Skip { id, reply } => {
                let result = match self.queue.find(&id) {
                    Some(index) => self.select(index).await,
                    None => Err(PlaybackError::TrackNotFound(id)),
                };
                reply.send(result).ok();
            }
            Command::SkipToNext { reply } => {
                let result = match self.queue.next_index() {
                    Some(index) => self.select(index).await,
                    None => Err(PlaybackError::NoNextTrack),
                };
                reply.send(result).ok();
            }
            Command::SkipToPrevious { reply } => {
                let result = match self.queue.previous_index() {
                    Some(index) => self.select(index).await,
                    None => Err(PlaybackError::NoPreviousTrack),
                };
                reply.send(result).ok();
            }
            Command::Play { reply } => {
                reply.send(self.play().await).ok();
            }
            Command::Pause { reply } => {
                reply.send(self.pause().await).ok();
            }
            Command::Stop { reply } => {
                reply.send(self.stop().await).ok();
            }
            Command::SeekTo { position_ms, reply } => {
                reply.send(self.seek_to(position_ms).await).ok();
            }
            Command::SetVolume { volume, reply } => {
                reply.send(self.set_volume(volume).await).ok();
            }
            Command::SetRate { rate, reply } => {
                reply.send(self.set_rate(rate).await).ok();
            }
            Command::Reset { reply } => {
                self.reset().await;
                reply.send(Ok(())).ok();
            }
            Command::Load {
                track,
                options,
                reply,
            } => self.load(track, options, reply).await,
            Command::UpdateMetadata {
                id,
                metadata,
                reply,
            } => {
                reply.send(self.update_metadata(&id, metadata)).ok();
            }
            Command::Handoff { connector, reply } => {
                reply.send(self.handoff(connector).await).ok();
            }
            Command::Status { reply } => {
                reply.send(self.status()).ok();
            }
            Command::Queue { reply } => {
                reply.send(self.queue.entries().to_vec()).ok();
            }
            Command::Shutdown { reply } => {
                reply.send(()).ok();
            }
        }
    }

    // ========================================================================
    // Queue commands
    // ========================================================================

    async fn add(&mut self, tracks: Vec<Track>, options: AddOptions) -> Result<usize> {
        options.validate()?;
        for track in &tracks {
            track.validate()?;
        }

        let was_empty = self.queue.is_empty();
        let index = self.queue.insert(tracks, options.before_id.as_deref())?;
        self.emit_queue_changed();

        if was_empty && !self.queue.is_empty() {
            self.emit_track_changed(None);
            if let Err(e) = self.load_current().await {
                warn!("Initial load failed: {}", e);
            }
        }
        Ok(index)
    }

    async fn remove(&mut self, ids: Vec<String>) -> Result<Vec<usize>> {
        let previous = self.current_marker();
        let removal = self.queue.remove_by_ids(&ids);
        if removal.is_empty() {
            return Ok(Vec::new());
        }
        self.emit_queue_changed();

        if removal.current_removed {
            self.emit_track_changed(previous);
            if self.queue.is_empty() {
                self.halt_backend().await;
                self.set_state(ControllerState::Idle);
            } else if let Err(e) = self.load_current().await {
                warn!("Load after removal failed: {}", e);
            }
        }
        Ok(removal.removed)
    }

    async fn select(&mut self, index: usize) -> Result<()> {
        let previous = self.current_marker();
        self.queue.move_current_to(index)?;
        self.emit_track_changed(previous);
        self.load_current().await
    }

    fn update_metadata(&mut self, id: &str, metadata: TrackMetadata) -> Result<()> {
        let index = self
            .queue
            .find(id)
            .ok_or_else(|| PlaybackError::TrackNotFound(id.to_string()))?;
        let updated = match self.queue.get(index) {
            Some(entry) => entry.track().replace_metadata(metadata),
            None => return Err(PlaybackError::TrackNotFound(id.to_string())),
        };
        updated.validate()?;
        self.queue.replace_track(id, updated)?;

        if self.queue.current_index() == Some(index) {
            self.emit(PlaybackEvent::MetadataUpdated {
                track_id: id.to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Transport commands
    // ========================================================================

    async fn play(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Idle | ControllerState::Loading => {
                self.play_when_ready = true;
                Ok(())
            }
            ControllerState::Ready | ControllerState::Paused => self.start_playback().await,
            ControllerState::Playing => Ok(()),
            ControllerState::Ended | ControllerState::Failed => {
                self.play_when_ready = true;
                self.load_current().await
            }
        }
    }

    async fn start_playback(&mut self) -> Result<()> {
        if !self.backend.is_remote() {
            if let Some(focus) = &self.audio_focus {
                if !focus.request_focus() {
                    warn!("Audio focus denied, not starting playback");
                    self.play_when_ready = false;
                    return Err(PlaybackError::Backend("audio focus was denied".to_string()));
                }
            }
        }

        self.backend.play().await?;
        self.play_when_ready = true;
        self.set_state(ControllerState::Playing);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.play_when_ready = false;
        if self.state == ControllerState::Playing {
            self.backend.pause().await?;
            self.set_state(ControllerState::Paused);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if matches!(
            self.state,
            ControllerState::Idle | ControllerState::Ended | ControllerState::Failed
        ) {
            return Ok(());
        }
        self.halt_backend().await;
        self.set_state(ControllerState::Ended);
        Ok(())
    }

    async fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::QueueEmpty);
        }
        self.backend.seek_to(position_ms).await?;
        self.seeking = true;
        self.emit(PlaybackEvent::StateChanged {
            state: PlaybackState::Buffering,
        });
        debug!(position_ms, "Seek issued");
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        self.backend.set_volume(volume).await?;
        self.volume = volume;
        Ok(())
    }

    async fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidRate(rate));
        }
        self.backend.set_rate(rate).await?;
        self.rate = self.backend.rate();
        Ok(())
    }

    async fn reset(&mut self) {
        let previous = self.current_marker();
        if self.state != ControllerState::Idle {
            self.halt_backend().await;
        }
        self.play_when_ready = false;
        self.queue.clear();
        self.emit_queue_changed();
        self.set_state(ControllerState::Idle);
        self.emit_track_changed(previous);
    }

    async fn load(&mut self, track: Track, options: LoadOptions, reply: Reply<()>) {
        if let Err(e) = track.validate() {
            reply.send(Err(e)).ok();
            return;
        }

        let previous = self.current_marker();
        let track_id = track.id().to_string();
        self.queue.replace_current(track);
        self.emit_queue_changed();
        self.emit_track_changed(previous);

        self.play_when_ready = options.play_when_ready;
        if let Err(e) = self.load_current().await {
            reply.send(Err(e)).ok();
            return;
        }
        self.pending_load = Some(PendingLoad {
            generation: self.generation,
            track_id,
            start_position_ms: options.start_position_ms,
            reply,
        });
    }

    // ========================================================================
    // Backend lifecycle
    // ========================================================================

    /// Load the current entry under a fresh generation.
    #[instrument(skip(self))]
    async fn load_current(&mut self) -> Result<()> {
        let track = self
            .queue
            .current()
            .map(|entry| entry.track().clone())
            .ok_or(PlaybackError::QueueEmpty)?;

        self.generation += 1;
        self.cancel_pending_load();
        self.seeking = false;
        self.set_state(ControllerState::Loading);
        info!(track_id = %track.id(), "Loading track");

        if let Err(e) = self.backend.load(&track, self.generation).await {
            error!(track_id = %track.id(), "Load rejected by backend: {}", e);
            self.set_state(ControllerState::Failed);
            self.emit(PlaybackEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
            return Err(e);
        }
        Ok(())
    }

    /// Stop the backend and forget the outstanding load.
    async fn halt_backend(&mut self) {
        self.generation += 1;
        self.cancel_pending_load();
        self.seeking = false;
        self.play_when_ready = false;
        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop backend: {}", e);
        }
        self.abandon_focus();
    }

    fn cancel_pending_load(&mut self) {
        if let Some(pending) = self.pending_load.take() {
            debug!(track_id = %pending.track_id, "Load superseded");
            pending
                .reply
                .send(Err(PlaybackError::LoadCancelled(pending.track_id)))
                .ok();
        }
    }

    fn abandon_focus(&self) {
        if !self.backend.is_remote() {
            if let Some(focus) = &self.audio_focus {
                focus.abandon_focus();
            }
        }
    }

    #[instrument(skip(self, connector), fields(target = %connector.describe()))]
    async fn handoff(&mut self, connector: Arc<dyn BackendConnector>) -> Result<()> {
        let snapshot = self.snapshot();
        let generation = self.generation + 1;
        let coordinator = HandoffCoordinator::new(connector, self.backend_tx.clone());

        let backend = match coordinator.attach(&snapshot, generation).await {
            Ok(backend) => backend,
            Err(e) => {
                self.emit(PlaybackEvent::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.abandon_focus();
        self.generation = generation;
        self.cancel_pending_load();
        self.seeking = false;
        let old = std::mem::replace(&mut self.backend, backend);
        HandoffCoordinator::retire(old).await;
        self.rate = self.backend.rate();

        if snapshot.current_index.is_some() {
            self.play_when_ready = snapshot.resume_playing();
            self.set_state(ControllerState::Loading);
        } else {
            self.set_state(ControllerState::Idle);
        }

        info!(
            backend = %self.backend.id(),
            remote = self.backend.is_remote(),
            "Handoff complete"
        );
        self.emit(PlaybackEvent::BackendChanged {
            remote: self.backend.is_remote(),
            device: self.backend.device_name(),
        });
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.halt_backend().await;
        if let Err(e) = self.backend.destroy().await {
            warn!("Failed to destroy backend: {}", e);
        }
    }

    // ========================================================================
    // Backend events
    // ========================================================================

    async fn handle_backend_event(&mut self, event: BackendEvent) {
        if event.backend != self.backend.id() || event.generation != self.generation {
            debug!(
                generation = event.generation,
                current = self.generation,
                "Discarding stale backend event"
            );
            return;
        }

        match event.kind {
            EngineEventKind::Prepared { duration_ms } => self.on_prepared(duration_ms).await,
            EngineEventKind::Buffering => {
                if self.state.is_loaded() {
                    self.emit(PlaybackEvent::StateChanged {
                        state: PlaybackState::Buffering,
                    });
                }
            }
            EngineEventKind::Ready => {
                if self.state.is_loaded() && !self.seeking {
                    self.emit_current_state();
                }
            }
            EngineEventKind::SeekCompleted { position_ms } => {
                if self.seeking {
                    self.seeking = false;
                    debug!(position_ms, "Seek completed");
                    self.emit_current_state();
                }
            }
            EngineEventKind::Ended => self.on_ended().await,
            EngineEventKind::Error { message } => self.on_error(message).await,
        }
    }

    async fn on_prepared(&mut self, duration_ms: Option<u64>) {
        if self.state != ControllerState::Loading {
            return;
        }
        debug!(?duration_ms, "Track prepared");
        self.set_state(ControllerState::Ready);

        if let Some(pending) = self.pending_load.take() {
            if let Some(position_ms) = pending.start_position_ms {
                if let Err(e) = self.backend.seek_to(position_ms).await {
                    warn!("Failed to apply start position: {}", e);
                }
            }
            debug_assert_eq!(pending.generation, self.generation);
            pending.reply.send(Ok(())).ok();
        }

        if self.play_when_ready {
            if let Err(e) = self.start_playback().await {
                warn!("Auto-play failed: {}", e);
            }
        }
    }

    async fn on_ended(&mut self) {
        let previous = self.current_marker();
        if self.advance_after(previous.clone()).await {
            return;
        }
        self.play_when_ready = false;
        self.set_state(ControllerState::Ended);
        self.abandon_focus();
        self.emit_queue_ended(previous);
    }

    async fn on_error(&mut self, message: String) {
        let previous = self.current_marker();
        let track_id = previous.as_ref().map(|(id, _)| id.clone()).unwrap_or_default();
        error!(track_id = %track_id, "Playback failed: {}", message);

        self.seeking = false;
        self.set_state(ControllerState::Failed);
        let err = PlaybackError::LoadFailed { track_id, message };
        self.emit(PlaybackEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
        if let Some(pending) = self.pending_load.take() {
            pending.reply.send(Err(err)).ok();
        }

        if self.config.auto_advance_on_error && self.advance_after(previous.clone()).await {
            return;
        }
        self.emit_queue_ended(previous);
    }

    /// Move to the next entry and load it. Returns `false` when there is no
    /// next entry to move to.
    ///
    /// With auto-advance on error, entries whose load the backend rejects
    /// outright are skipped as well; running out of entries that way ends
    /// the queue.
    async fn advance_after(&mut self, mut previous: Option<(String, u64)>) -> bool {
        let Some(mut next) = self.queue.next_index() else {
            return false;
        };
        loop {
            if self.queue.move_current_to(next).is_err() {
                return false;
            }
            self.emit_track_changed(previous);
            let Err(e) = self.load_current().await else {
                return true;
            };
            warn!("Failed to load next track: {}", e);
            if !self.config.auto_advance_on_error {
                return true;
            }

            previous = self.current_marker();
            match self.queue.next_index() {
                Some(index) => next = index,
                None => {
                    self.emit_queue_ended(previous);
                    return true;
                }
            }
        }
    }

    // ========================================================================
    // Status and notifications
    // ========================================================================

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tracks: self.queue.tracks(),
            current_index: self.queue.current_index(),
            position_ms: self.backend.position_ms(),
            state: self.state,
            volume: self.volume,
        }
    }

    fn status(&self) -> PlayerStatus {
        PlayerStatus {
            state: self.state,
            current_track: self.queue.current().map(|entry| entry.track().clone()),
            current_index: self.queue.current_index(),
            queue_length: self.queue.len(),
            position_ms: self.backend.position_ms(),
            buffered_position_ms: self.backend.buffered_position_ms(),
            duration_ms: self.backend.duration_ms(),
            volume: self.volume,
            rate: self.rate,
            is_remote: self.backend.is_remote(),
            device_name: self.backend.device_name(),
        }
    }

    /// Id and position of the current entry.
    fn current_marker(&self) -> Option<(String, u64)> {
        self.queue
            .current()
            .map(|entry| (entry.track().id().to_string(), self.backend.position_ms()))
    }

    fn set_state(&mut self, state: ControllerState) {
        let old = self.state;
        self.state = state;
        if old.playback_state() != state.playback_state() {
            debug!(from = ?old, to = ?state, "Controller state changed");
            self.emit_current_state();
        }
    }

    fn emit_current_state(&self) {
        self.emit(PlaybackEvent::StateChanged {
            state: self.state.playback_state(),
        });
    }

    fn emit_track_changed(&self, previous: Option<(String, u64)>) {
        let (previous_track_id, previous_position_ms) = match previous {
            Some((id, position)) => (Some(id), position),
            None => (None, 0),
        };
        self.emit(PlaybackEvent::TrackChanged {
            previous_track_id,
            previous_position_ms,
            next_track_id: self
                .queue
                .current()
                .map(|entry| entry.track().id().to_string()),
        });
    }

    fn emit_queue_ended(&self, previous: Option<(String, u64)>) {
        let (track_id, position_ms) = match previous {
            Some((id, position)) => (Some(id), position),
            None => (None, 0),
        };
        info!(?track_id, "Queue ended");
        self.emit(PlaybackEvent::QueueEnded {
            track_id,
            position_ms,
        });
    }

    fn emit_queue_changed(&self) {
        self.events
            .emit(CoreEvent::Queue(QueueEvent::Changed {
                length: self.queue.len(),
                current_index: self.queue.current_index(),
            }))
            .ok();
    }

    fn emit(&self, event: PlaybackEvent) {
        self.events.emit(CoreEvent::Playback(event)).ok();
    }
}
