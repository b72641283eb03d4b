//! On-device backend over a host [`MediaEngine`].

use super::{
    BackendConnector, BackendEventSender, BackendId, EventRelay, PlaybackBackend, StatusCell,
};
use crate::cache::{CacheStore, CachingDataSourceFactory};
use crate::error::{PlaybackError, Result};
use crate::track::Track;
use bridge_traits::{DataSourceFactory, MediaEngine, MediaEngineFactory, PlaybackState};
use core_runtime::logging::redact_headers;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives one engine instance. Disposed, never reused, once replaced.
pub struct LocalBackend {
    id: BackendId,
    engine: Arc<dyn MediaEngine>,
    status: Arc<StatusCell>,
    cache: Option<CacheStore>,
}

impl LocalBackend {
    pub fn new(engine: Arc<dyn MediaEngine>, events: BackendEventSender) -> Self {
        let id = BackendId::new();
        let status = Arc::new(StatusCell::new(1.0));
        engine.set_listener(Arc::new(EventRelay::new(id, status.clone(), events)));
        Self {
            id,
            engine,
            status,
            cache: None,
        }
    }

    /// Share the process cache with this backend.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Route the engine's network reads through the cache.
    ///
    /// Returns the wrapped factory, which is also installed on the engine.
    /// Without a cache the upstream factory is installed unchanged.
    pub fn enable_caching(&self, upstream: Arc<dyn DataSourceFactory>) -> Arc<dyn DataSourceFactory> {
        let factory: Arc<dyn DataSourceFactory> = match &self.cache {
            Some(cache) => Arc::new(CachingDataSourceFactory::new(upstream, cache.clone())),
            None => {
                warn!("Caching requested without a cache store, reading upstream directly");
                upstream
            }
        };
        self.engine.use_data_source(factory.clone());
        factory
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl PlaybackBackend for LocalBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn is_remote(&self) -> bool {
        false
    }

    #[instrument(skip(self, track), fields(track_id = %track.id()))]
    async fn load(&self, track: &Track, generation: u64) -> Result<()> {
        self.status.begin_load(generation, track.duration_hint_ms());
        debug!(
            generation,
            uri = %track.uri(),
            headers = %redact_headers(track.headers()),
            "Preparing track"
        );

        self.engine
            .prepare(track.to_media_request(), generation)
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
        self.engine.play().await?;
        self.status.set_playing(true);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.engine.pause().await?;
        self.status.set_playing(false);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.status.invalidate();
        self.engine.stop().await?;
        Ok(())
    }

    async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.engine.seek(position_ms).await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.engine.set_volume(volume).await?;
        self.status.set_volume(volume);
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<()> {
        self.engine.set_rate(rate).await?;
        self.status.set_rate(rate);
        Ok(())
    }

    fn state(&self) -> PlaybackState {
        self.status.snapshot().state
    }

    fn position_ms(&self) -> u64 {
        self.engine.position_ms()
    }

    fn buffered_position_ms(&self) -> u64 {
        self.engine.buffered_position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        self.engine.duration_ms().or(self.status.snapshot().duration_ms)
    }

    fn volume(&self) -> f32 {
        self.status.snapshot().volume
    }

    fn rate(&self) -> f32 {
        self.status.snapshot().rate
    }

    async fn destroy(&self) -> Result<()> {
        self.status.invalidate();
        self.engine.release().await?;
        debug!(backend = %self.id, "Local backend destroyed");
        Ok(())
    }
}

/// Creates a [`LocalBackend`] with a fresh engine per connection.
pub struct LocalConnector {
    engine_factory: Arc<dyn MediaEngineFactory>,
    cache: Option<CacheStore>,
    upstream: Option<Arc<dyn DataSourceFactory>>,
}

impl LocalConnector {
    pub fn new(engine_factory: Arc<dyn MediaEngineFactory>) -> Self {
        Self {
            engine_factory,
            cache: None,
            upstream: None,
        }
    }

    /// Cache streamed reads made through `upstream`.
    pub fn with_caching(mut self, cache: CacheStore, upstream: Arc<dyn DataSourceFactory>) -> Self {
        self.cache = Some(cache);
        self.upstream = Some(upstream);
        self
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl BackendConnector for LocalConnector {
    fn describe(&self) -> String {
        "local playback".to_string()
    }

    async fn connect(&self, events: BackendEventSender) -> Result<Box<dyn PlaybackBackend>> {
        let engine = self.engine_factory.create_engine()?;
        let mut backend = LocalBackend::new(engine, events);

        if let Some(cache) = &self.cache {
            backend = backend.with_cache(cache.clone());
            if let Some(upstream) = &self.upstream {
                backend.enable_caching(upstream.clone());
            }
        }

        info!(backend = %backend.id, cached = backend.cache.is_some(), "Local backend ready");
        Ok(Box::new(backend))
    }
}
