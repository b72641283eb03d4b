//! Backend over a connected [`RemoteReceiver`].

use super::{
    BackendConnector, BackendEventSender, BackendId, EventRelay, PlaybackBackend, StatusCell,
};
use crate::error::{PlaybackError, Result};
use crate::track::Track;
use bridge_traits::{PlaybackState, RemoteReceiver};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives a remote device. Audio focus never applies to it.
pub struct RemoteBackend {
    id: BackendId,
    receiver: Arc<dyn RemoteReceiver>,
    status: Arc<StatusCell>,
}

impl RemoteBackend {
    /// Open a session with `receiver`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Backend`] when the device refuses the session.
    #[instrument(skip(receiver, events), fields(device = %receiver.device_name()))]
    pub async fn connect(
        receiver: Arc<dyn RemoteReceiver>,
        events: BackendEventSender,
    ) -> Result<Self> {
        let id = BackendId::new();
        let status = Arc::new(StatusCell::new(1.0));
        receiver
            .connect(Arc::new(EventRelay::new(id, status.clone(), events)))
            .await?;

        info!(backend = %id, "Connected to remote receiver");
        Ok(Self {
            id,
            receiver,
            status,
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl PlaybackBackend for RemoteBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn device_name(&self) -> Option<String> {
        Some(self.receiver.device_name())
    }

    async fn load(&self, track: &Track, generation: u64) -> Result<()> {
        self.status.begin_load(generation, track.duration_hint_ms());
        self.receiver
            .load(track.to_media_request(), generation)
            .await
            .map_err(|e| {
                self.status.fail_load();
                PlaybackError::LoadFailed {
                    track_id: track.id().to_string(),
                    message: e.to_string(),
                }
            })
    }

    async fn play(&self) -> Result<()> {
        self.receiver.play().await?;
        self.status.set_playing(true);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.receiver.pause().await?;
        self.status.set_playing(false);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.status.invalidate();
        self.receiver.stop().await?;
        Ok(())
    }

    async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.receiver.seek(position_ms).await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        if !self.receiver.can_change_volume() {
            warn!(
                device = %self.receiver.device_name(),
                "Ignoring volume change on fixed-volume receiver"
            );
            return Ok(());
        }
        self.receiver.set_volume(volume).await?;
        self.status.set_volume(volume);
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<()> {
        warn!(rate, "Remote receivers play at normal rate, ignoring rate change");
        Ok(())
    }

    fn state(&self) -> PlaybackState {
        self.status.snapshot().state
    }

    fn position_ms(&self) -> u64 {
        self.receiver.position_ms()
    }

    fn buffered_position_ms(&self) -> u64 {
        self.receiver.buffered_position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        self.receiver
            .duration_ms()
            .or(self.status.snapshot().duration_ms)
    }

    fn volume(&self) -> f32 {
        self.status.snapshot().volume
    }

    fn rate(&self) -> f32 {
        self.status.snapshot().rate
    }

    fn can_change_volume(&self) -> bool {
        self.receiver.can_change_volume()
    }

    async fn set_queue_hint(&self, tracks: &[Track], current: Option<usize>) -> Result<()> {
        let items = tracks.iter().map(Track::to_media_request).collect();
        self.receiver.set_queue(items, current).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.status.invalidate();
        self.receiver.disconnect().await?;
        debug!(backend = %self.id, "Remote backend destroyed");
        Ok(())
    }
}

/// Connects a [`RemoteBackend`] to one receiver.
pub struct RemoteConnector {
    receiver: Arc<dyn RemoteReceiver>,
}

impl RemoteConnector {
    pub fn new(receiver: Arc<dyn RemoteReceiver>) -> Self {
        Self { receiver }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl BackendConnector for RemoteConnector {
    fn describe(&self) -> String {
        format!("remote receiver {}", self.receiver.device_name())
    }

    async fn connect(&self, events: BackendEventSender) -> Result<Box<dyn PlaybackBackend>> {
        let backend = RemoteBackend::connect(self.receiver.clone(), events).await?;
        Ok(Box::new(backend))
    }
}
