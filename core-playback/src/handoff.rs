//! # Handoff
//!
//! Moves a playback session from the active backend to a new one, e.g. from
//! the device to a cast receiver. The new backend is connected, given the
//! queue, loaded and positioned before the old one is touched. Any failure in
//! those steps destroys the new backend and leaves the session as it was.

use crate::backend::{BackendConnector, BackendEventSender, PlaybackBackend};
use crate::controller::ControllerState;
use crate::error::{PlaybackError, Result};
use crate::track::Track;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What the outgoing backend was doing when the handoff started.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub tracks: Vec<Track>,
    pub current_index: Option<usize>,
    pub position_ms: u64,
    pub state: ControllerState,
    pub volume: f32,
}

impl SessionSnapshot {
    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|index| self.tracks.get(index))
    }

    /// Playback restarts on the new backend only if it was running.
    pub fn resume_playing(&self) -> bool {
        self.state == ControllerState::Playing
    }
}

pub struct HandoffCoordinator {
    connector: Arc<dyn BackendConnector>,
    events: BackendEventSender,
}

impl HandoffCoordinator {
    pub fn new(connector: Arc<dyn BackendConnector>, events: BackendEventSender) -> Self {
        Self { connector, events }
    }

    /// Connect the new backend and replay `snapshot` into it, loading the
    /// current track under `generation`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::HandoffFailed`] when connecting, replaying the queue,
    /// loading or seeking fails. The new backend has been destroyed by then.
    #[instrument(skip(self, snapshot), fields(target = %self.connector.describe()))]
    pub async fn attach(
        &self,
        snapshot: &SessionSnapshot,
        generation: u64,
    ) -> Result<Box<dyn PlaybackBackend>> {
        let target = self.connector.describe();
        let backend = self
            .connector
            .connect(self.events.clone())
            .await
            .map_err(|e| PlaybackError::HandoffFailed(format!("{}: {}", target, e)))?;

        if let Err(e) = Self::replay(backend.as_ref(), snapshot, generation).await {
            warn!("Handoff to {} aborted: {}", target, e);
            if let Err(destroy_err) = backend.destroy().await {
                warn!("Failed to destroy abandoned backend: {}", destroy_err);
            }
            return Err(PlaybackError::HandoffFailed(format!("{}: {}", target, e)));
        }

        info!(
            position_ms = snapshot.position_ms,
            tracks = snapshot.tracks.len(),
            "Session replayed on {}",
            target
        );
        Ok(backend)
    }

    async fn replay(
        backend: &dyn PlaybackBackend,
        snapshot: &SessionSnapshot,
        generation: u64,
    ) -> Result<()> {
        backend
            .set_queue_hint(&snapshot.tracks, snapshot.current_index)
            .await?;
        if backend.can_change_volume() {
            backend.set_volume(snapshot.volume).await?;
        }

        let Some(track) = snapshot.current_track() else {
            return Ok(());
        };
        backend.load(track, generation).await?;
        if snapshot.position_ms > 0 {
            backend.seek_to(snapshot.position_ms).await?;
        }
        Ok(())
    }

    /// Stop and destroy the outgoing backend. Failures are logged only; the
    /// session already lives on the new backend.
    pub async fn retire(old: Box<dyn PlaybackBackend>) {
        if let Err(e) = old.stop().await {
            warn!(backend = %old.id(), "Failed to stop outgoing backend: {}", e);
        }
        if let Err(e) = old.destroy().await {
            warn!(backend = %old.id(), "Failed to destroy outgoing backend: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_current_track() {
        let snapshot = SessionSnapshot {
            tracks: vec![Track::new("t1", "a"), Track::new("t2", "b")],
            current_index: Some(1),
            position_ms: 5_000,
            state: ControllerState::Paused,
            volume: 1.0,
        };
        assert_eq!(snapshot.current_track().map(Track::id), Some("t2"));
        assert!(!snapshot.resume_playing());

        let empty = SessionSnapshot {
            tracks: Vec::new(),
            current_index: None,
            position_ms: 0,
            state: ControllerState::Idle,
            volume: 1.0,
        };
        assert!(empty.current_track().is_none());
    }
}
