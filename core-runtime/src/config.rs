//! # Player Configuration
//!
//! Builder for [`PlayerConfig`], the bundle of host capabilities and settings
//! a player needs before it can start. Validation is fail-fast: a missing
//! required capability is reported with an actionable message at `build()`
//! time, never later during playback.
//!
//! ## Required Dependencies
//!
//! - `MediaEngineFactory` - on-device decode/render engines
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `SpanStorage` - media cache storage (desktop default: file-backed spans)
//! - `AudioFocus` - output focus arbitration (desktop default: always granted)
//! - `DataSourceFactory` - upstream byte reader routed through the cache
//! - `Clock` - cache recency source (default: system clock)
//! - `LoggerSink` - host log forwarding
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PlayerConfig;
//! use std::sync::Arc;
//!
//! let config = PlayerConfig::builder()
//!     .engine_factory(Arc::new(MyEngineFactory))
//!     .cache_dir("/var/cache/player")
//!     .cache_size_mb(256)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    AudioFocus, Clock, DataSourceFactory, LoggerSink, MediaEngineFactory, SpanStorage, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Largest accepted cache budget (100 GB).
pub const MAX_CACHE_SIZE_BYTES: u64 = 100 * 1024 * 1024 * 1024;

const DEFAULT_CACHE_SIZE_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct PlayerConfig {
    /// Directory the default span storage writes into.
    pub cache_dir: Option<PathBuf>,

    /// Media cache budget. `0` disables caching.
    pub cache_size_bytes: u64,

    /// Capacity of the event broadcast channel.
    pub event_buffer_size: usize,

    /// Volume applied to the first backend (0.0 - 1.0).
    pub initial_volume: f32,

    /// Move to the next entry when the backend reports an error.
    pub auto_advance_on_error: bool,

    pub engine_factory: Arc<dyn MediaEngineFactory>,

    pub span_storage: Option<Arc<dyn SpanStorage>>,

    pub audio_focus: Option<Arc<dyn AudioFocus>>,

    pub upstream_data_source: Option<Arc<dyn DataSourceFactory>>,

    pub clock: Arc<dyn Clock>,

    pub logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl std::fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConfig")
            .field("cache_dir", &self.cache_dir)
            .field("cache_size_bytes", &self.cache_size_bytes)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("initial_volume", &self.initial_volume)
            .field("auto_advance_on_error", &self.auto_advance_on_error)
            .field("engine_factory", &"MediaEngineFactory { ... }")
            .field(
                "span_storage",
                &self.span_storage.as_ref().map(|_| "SpanStorage { ... }"),
            )
            .field(
                "audio_focus",
                &self.audio_focus.as_ref().map(|_| "AudioFocus { ... }"),
            )
            .field(
                "upstream_data_source",
                &self
                    .upstream_data_source
                    .as_ref()
                    .map(|_| "DataSourceFactory { ... }"),
            )
            .finish()
    }
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache_size_bytes > 0
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "Initial volume must be between 0.0 and 1.0, got {}",
                self.initial_volume
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.cache_size_bytes > MAX_CACHE_SIZE_BYTES {
            return Err(Error::Config(
                "Cache size exceeds maximum of 100GB".to_string(),
            ));
        }

        if self.caching_enabled() && self.span_storage.is_none() {
            return Err(span_storage_missing_error());
        }

        Ok(())
    }
}

fn engine_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaEngineFactory".to_string(),
        message: "A media engine factory is required for local playback. \
                 Inject the host decode/render pipeline with .engine_factory()."
            .to_string(),
    }
}

fn span_storage_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SpanStorage".to_string(),
        message: "Caching is enabled but no SpanStorage is available. \
                 Desktop: enable the 'desktop-shims' feature and set a cache directory. \
                 Other hosts: inject a SpanStorage or set cache_size_bytes(0)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_span_storage(cache_dir: &std::path::Path) -> Result<Arc<dyn SpanStorage>> {
    use bridge_desktop::DiskSpanStorage;

    let storage = DiskSpanStorage::new(cache_dir).map_err(|e| {
        Error::Internal(format!("Failed to initialize default SpanStorage: {}", e))
    })?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_span_storage(_cache_dir: &std::path::Path) -> Result<Arc<dyn SpanStorage>> {
    Err(span_storage_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_cache_dir() -> Option<PathBuf> {
    bridge_desktop::default_cache_dir()
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_cache_dir() -> Option<PathBuf> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_audio_focus() -> Option<Arc<dyn AudioFocus>> {
    Some(Arc::new(bridge_desktop::DesktopAudioFocus::default()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_audio_focus() -> Option<Arc<dyn AudioFocus>> {
    None
}

#[derive(Default)]
pub struct PlayerConfigBuilder {
    cache_dir: Option<PathBuf>,
    cache_size_bytes: Option<u64>,
    event_buffer_size: Option<usize>,
    initial_volume: Option<f32>,
    auto_advance_on_error: Option<bool>,
    engine_factory: Option<Arc<dyn MediaEngineFactory>>,
    span_storage: Option<Arc<dyn SpanStorage>>,
    audio_focus: Option<Arc<dyn AudioFocus>>,
    upstream_data_source: Option<Arc<dyn DataSourceFactory>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl PlayerConfigBuilder {
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn cache_size_bytes(mut self, bytes: u64) -> Self {
        self.cache_size_bytes = Some(bytes);
        self
    }

    pub fn cache_size_mb(self, size_mb: u64) -> Self {
        self.cache_size_bytes(size_mb * 1024 * 1024)
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = Some(volume);
        self
    }

    pub fn auto_advance_on_error(mut self, enabled: bool) -> Self {
        self.auto_advance_on_error = Some(enabled);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn MediaEngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn span_storage(mut self, storage: Arc<dyn SpanStorage>) -> Self {
        self.span_storage = Some(storage);
        self
    }

    pub fn audio_focus(mut self, focus: Arc<dyn AudioFocus>) -> Self {
        self.audio_focus = Some(focus);
        self
    }

    pub fn upstream_data_source(mut self, factory: Arc<dyn DataSourceFactory>) -> Self {
        self.upstream_data_source = Some(factory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<PlayerConfig> {
        let engine_factory = self
            .engine_factory
            .ok_or_else(engine_factory_missing_error)?;

        let cache_size_bytes = self.cache_size_bytes.unwrap_or(DEFAULT_CACHE_SIZE_BYTES);
        let cache_dir = self.cache_dir.or_else(provide_default_cache_dir);

        let span_storage = match (self.span_storage, cache_size_bytes) {
            (Some(storage), _) => Some(storage),
            (None, 0) => None,
            (None, _) => {
                let dir = cache_dir.as_deref().ok_or_else(|| {
                    Error::Config(
                        "Cache directory is required when caching is enabled. \
                         Use .cache_dir() to set it."
                            .to_string(),
                    )
                })?;
                Some(provide_default_span_storage(dir)?)
            }
        };

        let config = PlayerConfig {
            cache_dir,
            cache_size_bytes,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            initial_volume: self.initial_volume.unwrap_or(1.0),
            auto_advance_on_error: self.auto_advance_on_error.unwrap_or(true),
            engine_factory,
            span_storage,
            audio_focus: self.audio_focus.or_else(provide_default_audio_focus),
            upstream_data_source: self.upstream_data_source,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
        };

        config.validate()?;
        Ok(config)
    }
}
