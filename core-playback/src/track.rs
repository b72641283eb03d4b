//! Track values and queue entries.

use crate::error::{PlaybackError, Result};
use bridge_traits::{MediaDescription, MediaRequest, MediaType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Free-form display metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// URI or host-specific reference of the artwork image.
    pub artwork: Option<String>,
    /// Rating in `0.0..=1.0`, when the host tracks one.
    pub rating: Option<f32>,
}

/// Immutable description of one playable item.
///
/// A metadata update produces a new `Track` that replaces the old value in
/// the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: String,
    uri: String,
    #[serde(default)]
    media_type: MediaType,
    #[serde(default)]
    duration_hint_ms: Option<u64>,
    #[serde(default)]
    metadata: TrackMetadata,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl Track {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            media_type: MediaType::Default,
            duration_hint_ms: None,
            metadata: TrackMetadata::default(),
            headers: HashMap::new(),
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_duration_hint_ms(mut self, duration_ms: u64) -> Self {
        self.duration_hint_ms = Some(duration_ms);
        self
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.metadata.artist = Some(artist.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn duration_hint_ms(&self) -> Option<u64> {
        self.duration_hint_ms
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Copy of this track carrying `metadata` instead.
    pub fn replace_metadata(&self, metadata: TrackMetadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PlaybackError::InvalidTrack("track id is empty".to_string()));
        }
        if self.uri.trim().is_empty() {
            return Err(PlaybackError::InvalidTrack(format!(
                "track {} has an empty uri",
                self.id
            )));
        }
        if let Some(rating) = self.metadata.rating {
            if !(0.0..=1.0).contains(&rating) {
                return Err(PlaybackError::InvalidTrack(format!(
                    "track {} has rating {} outside 0.0..=1.0",
                    self.id, rating
                )));
            }
        }
        Ok(())
    }

    /// Request handed to engines and receivers.
    pub fn to_media_request(&self) -> MediaRequest {
        let mut request = MediaRequest::new(&self.id, &self.uri)
            .with_media_type(self.media_type)
            .with_description(MediaDescription {
                title: self.metadata.title.clone(),
                artist: self.metadata.artist.clone(),
                album: self.metadata.album.clone(),
                artwork: self.metadata.artwork.clone(),
                duration_ms: self.duration_hint_ms,
            });
        request.headers = self.headers.clone();
        request
    }
}

/// Process-lifetime-unique identity of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(u64);

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

impl QueueId {
    pub fn next() -> Self {
        Self(NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// One occurrence of a track in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    queue_id: QueueId,
    track: Track,
}

impl QueueEntry {
    pub fn new(track: Track) -> Self {
        Self {
            queue_id: QueueId::next(),
            track,
        }
    }

    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub(crate) fn set_track(&mut self, track: Track) {
        self.track = track;
    }
}
