//! The player façade handed to host applications.

use crate::cache_registry::{cache_id, CacheRegistry};
use crate::error::{Result, ServiceError};
use bridge_traits::RemoteReceiver;
use core_playback::{
    AddOptions, BackendConnector, CacheConfig, CacheStats, CacheStore, ControllerConfig,
    LoadOptions, LocalConnector, PlaybackController, PlayerStatus, QueueEntry, RemoteConnector,
    Track, TrackMetadata,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, strip_path, LoggingConfig};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A running player: controller, event bus and shared cache.
///
/// Cloning is cheap; every clone drives the same controller.
#[derive(Clone)]
pub struct PlayerService {
    controller: PlaybackController,
    local: Arc<dyn BackendConnector>,
    events: EventBus,
    cache: Option<CacheStore>,
    cache_id: Option<String>,
    registry: Arc<CacheRegistry>,
}

impl PlayerService {
    /// Start a player using the process-wide cache registry.
    pub async fn new(config: PlayerConfig) -> Result<Self> {
        Self::with_registry(config, CacheRegistry::global()).await
    }

    #[instrument(skip_all)]
    pub async fn with_registry(config: PlayerConfig, registry: Arc<CacheRegistry>) -> Result<Self> {
        config.validate()?;

        if let Some(sink) = &config.logger_sink {
            let logging = LoggingConfig::default().with_logger_sink(sink.clone());
            if let Err(e) = init_logging(logging) {
                warn!("Host logger sink not installed: {}", e);
            }
        }

        let events = EventBus::new(config.event_buffer_size);
        let (cache, cache_id) = Self::open_cache(&config, &registry, &events)?;

        let mut local = LocalConnector::new(config.engine_factory.clone());
        match (&cache, &config.upstream_data_source) {
            (Some(cache), Some(upstream)) => {
                local = local.with_caching(cache.clone(), upstream.clone());
            }
            (Some(_), None) => {
                warn!("Cache configured without an upstream data source; streams bypass it");
            }
            _ => {}
        }
        let local: Arc<dyn BackendConnector> = Arc::new(local);

        let controller_config = ControllerConfig {
            auto_advance_on_error: config.auto_advance_on_error,
            initial_volume: config.initial_volume,
            ..ControllerConfig::default()
        };
        let mut builder = PlaybackController::builder(local.clone())
            .config(controller_config)
            .events(events.clone());
        if let Some(focus) = &config.audio_focus {
            builder = builder.audio_focus(focus.clone());
        }
        let controller = builder.start().await?;

        info!(cached = cache.is_some(), "Player service started");
        Ok(Self {
            controller,
            local,
            events,
            cache,
            cache_id,
            registry,
        })
    }

    fn open_cache(
        config: &PlayerConfig,
        registry: &CacheRegistry,
        events: &EventBus,
    ) -> Result<(Option<CacheStore>, Option<String>)> {
        if !config.caching_enabled() {
            return Ok((None, None));
        }
        let storage = config.span_storage.clone().ok_or_else(|| {
            ServiceError::InitializationFailed("caching enabled without span storage".into())
        })?;

        let max_span = CacheConfig::default()
            .max_span_bytes
            .min(config.cache_size_bytes);
        let cache_config = CacheConfig::new()
            .with_max_size(config.cache_size_bytes)
            .with_max_span_bytes(max_span);
        let id = cache_id(config.cache_dir.as_deref(), &cache_config);

        let store = registry.get_or_init(&id, || {
            CacheStore::initialize(
                cache_config,
                storage,
                config.clock.clone(),
                None,
            )
        })?;
        store.attach_events(events.clone());
        info!(cache = %strip_path(&id), "Media cache opened");
        Ok((Some(store), Some(id)))
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.events.stream()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Queue
    // ========================================================================

    pub async fn add(&self, tracks: Vec<Track>, options: AddOptions) -> Result<usize> {
        Ok(self.controller.add(tracks, options).await?)
    }

    pub async fn remove(&self, ids: Vec<String>) -> Result<Vec<usize>> {
        Ok(self.controller.remove(ids).await?)
    }

    pub async fn skip(&self, id: &str) -> Result<()> {
        Ok(self.controller.skip(id).await?)
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        Ok(self.controller.skip_to_next().await?)
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        Ok(self.controller.skip_to_previous().await?)
    }

    pub async fn update_metadata(&self, id: &str, metadata: TrackMetadata) -> Result<()> {
        Ok(self.controller.update_metadata(id, metadata).await?)
    }

    pub async fn queue(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.controller.queue().await?)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub async fn load(&self, track: Track, options: LoadOptions) -> Result<()> {
        Ok(self.controller.load(track, options).await?)
    }

    pub async fn play(&self) -> Result<()> {
        Ok(self.controller.play().await?)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.controller.pause().await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.controller.stop().await?)
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        Ok(self.controller.seek_to(position_ms).await?)
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        Ok(self.controller.set_volume(volume).await?)
    }

    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        Ok(self.controller.set_rate(rate).await?)
    }

    pub async fn reset(&self) -> Result<()> {
        Ok(self.controller.reset().await?)
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        Ok(self.controller.status().await?)
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Move the session to `receiver`.
    pub async fn transfer_to_remote(&self, receiver: Arc<dyn RemoteReceiver>) -> Result<()> {
        let connector = Arc::new(RemoteConnector::new(receiver));
        Ok(self.controller.handoff(connector).await?)
    }

    /// Bring the session back to a fresh on-device engine.
    pub async fn transfer_to_local(&self) -> Result<()> {
        Ok(self.controller.handoff(self.local.clone()).await?)
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(CacheStore::stats)
    }

    /// Invalidate every cached span of `key`.
    pub fn evict_cache_for(&self, key: &str) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |cache| cache.evict_all_for_key(key))
    }

    /// Release the whole cache. Streaming keeps working uncached afterwards.
    pub fn clear_cache(&self) -> u64 {
        match &self.cache_id {
            Some(id) => self.registry.drop_all(id),
            None => 0,
        }
    }

    /// Stop playback and tear down the controller. The shared cache stays
    /// registered for other services.
    pub async fn shutdown(&self) -> Result<()> {
        self.controller.shutdown().await?;
        info!("Player service stopped");
        Ok(())
    }
}
