//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AudioFocus, DataSourceFactory, EngineEvent, EngineEventKind, EngineListener, MediaEngine,
    MediaEngineFactory, MediaRequest, RemoteReceiver,
};
use core_playback::backend::{BackendConnector, BackendEventSender, PlaybackBackend};
use core_playback::{
    LocalConnector, PlaybackController, PlaybackError, Result, Track,
};
use core_runtime::events::{CoreEvent, EventStream, PlaybackEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Media engine
// ============================================================================

/// Records every call and lets the test raise notifications by hand.
#[derive(Default)]
pub struct FakeEngine {
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<u64>>,
    position_ms: AtomicU64,
    reject_prepare: AtomicBool,
    released: AtomicBool,
    data_source: Mutex<Option<Arc<dyn DataSourceFactory>>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn prepared_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| c.strip_prefix("prepare:").map(str::to_string))
            .collect()
    }

    pub fn tokens(&self) -> Vec<u64> {
        self.tokens.lock().clone()
    }

    pub fn last_token(&self) -> u64 {
        self.tokens.lock().last().copied().unwrap_or(0)
    }

    pub fn set_position(&self, position_ms: u64) {
        self.position_ms.store(position_ms, Ordering::SeqCst);
    }

    pub fn reject_prepare(&self, reject: bool) {
        self.reject_prepare.store(reject, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn has_data_source(&self) -> bool {
        self.data_source.lock().is_some()
    }

    pub fn emit(&self, token: u64, kind: EngineEventKind) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_event(EngineEvent::new(token, kind));
        }
    }

    /// Report the latest load as prepared.
    pub fn prepared(&self) {
        self.emit(
            self.last_token(),
            EngineEventKind::Prepared {
                duration_ms: Some(180_000),
            },
        );
    }

    pub fn ended(&self) {
        self.emit(self.last_token(), EngineEventKind::Ended);
    }

    pub fn fail(&self, message: &str) {
        self.emit(
            self.last_token(),
            EngineEventKind::Error {
                message: message.to_string(),
            },
        );
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn set_listener(&self, listener: Arc<dyn EngineListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn use_data_source(&self, factory: Arc<dyn DataSourceFactory>) {
        *self.data_source.lock() = Some(factory);
    }

    async fn prepare(&self, request: MediaRequest, token: u64) -> BridgeResult<()> {
        if self.reject_prepare.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("unsupported format".into()));
        }
        self.record(format!("prepare:{}", request.item_id));
        self.tokens.lock().push(token);
        self.position_ms.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record("play".into());
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause".into());
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop".into());
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek:{}", position_ms));
        self.position_ms.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.record(format!("volume:{}", volume));
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> BridgeResult<()> {
        self.record(format!("rate:{}", rate));
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn buffered_position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst) + 10_000
    }

    fn duration_ms(&self) -> Option<u64> {
        None
    }

    async fn release(&self) -> BridgeResult<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fresh [`FakeEngine`] per backend and keeps them for inspection.
#[derive(Default)]
pub struct FakeEngineFactory {
    engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeEngineFactory {
    pub fn latest(&self) -> Arc<FakeEngine> {
        self.engines
            .lock()
            .last()
            .cloned()
            .expect("no engine created yet")
    }

    pub fn created(&self) -> usize {
        self.engines.lock().len()
    }
}

impl MediaEngineFactory for FakeEngineFactory {
    fn create_engine(&self) -> BridgeResult<Arc<dyn MediaEngine>> {
        let engine = Arc::new(FakeEngine::default());
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}

// ============================================================================
// Remote receiver
// ============================================================================

#[derive(Default)]
pub struct FakeReceiver {
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    calls: Mutex<Vec<String>>,
    tokens: Mutex<Vec<u64>>,
    queue: Mutex<Vec<String>>,
    position_ms: AtomicU64,
    pub reject_connect: AtomicBool,
    pub reject_load: AtomicBool,
    pub fixed_volume: AtomicBool,
}

impl FakeReceiver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn queue(&self) -> Vec<String> {
        self.queue.lock().clone()
    }

    pub fn last_token(&self) -> u64 {
        self.tokens.lock().last().copied().unwrap_or(0)
    }

    pub fn prepared(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_event(EngineEvent::new(
                self.last_token(),
                EngineEventKind::Prepared { duration_ms: None },
            ));
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RemoteReceiver for FakeReceiver {
    fn device_name(&self) -> String {
        "Living Room".to_string()
    }

    async fn connect(&self, listener: Arc<dyn EngineListener>) -> BridgeResult<()> {
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::Rejected("device busy".into()));
        }
        *self.listener.lock() = Some(listener);
        self.record("connect".into());
        Ok(())
    }

    async fn disconnect(&self) -> BridgeResult<()> {
        self.record("disconnect".into());
        Ok(())
    }

    async fn set_queue(&self, items: Vec<MediaRequest>, _start_index: Option<usize>) -> BridgeResult<()> {
        *self.queue.lock() = items.into_iter().map(|item| item.item_id).collect();
        Ok(())
    }

    async fn load(&self, request: MediaRequest, token: u64) -> BridgeResult<()> {
        if self.reject_load.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("receiver cannot play uri".into()));
        }
        self.record(format!("load:{}", request.item_id));
        self.tokens.lock().push(token);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record("play".into());
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause".into());
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop".into());
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> BridgeResult<()> {
        self.record(format!("seek:{}", position_ms));
        self.position_ms.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.record(format!("volume:{}", volume));
        Ok(())
    }

    fn can_change_volume(&self) -> bool {
        !self.fixed_volume.load(Ordering::SeqCst)
    }

    fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn buffered_position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> Option<u64> {
        Some(180_000)
    }
}

// ============================================================================
// Other collaborators
// ============================================================================

/// Connector whose device never answers.
pub struct FailingConnector;

#[async_trait]
impl BackendConnector for FailingConnector {
    fn describe(&self) -> String {
        "unreachable receiver".to_string()
    }

    async fn connect(&self, _events: BackendEventSender) -> Result<Box<dyn PlaybackBackend>> {
        Err(PlaybackError::Backend("device unreachable".to_string()))
    }
}

pub struct FakeFocus {
    pub grant: AtomicBool,
    pub requests: AtomicUsize,
    pub abandons: AtomicUsize,
}

impl FakeFocus {
    pub fn granting(grant: bool) -> Self {
        Self {
            grant: AtomicBool::new(grant),
            requests: AtomicUsize::new(0),
            abandons: AtomicUsize::new(0),
        }
    }
}

impl AudioFocus for FakeFocus {
    fn request_focus(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.grant.load(Ordering::SeqCst)
    }

    fn abandon_focus(&self) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| Track::new(*id, format!("https://cdn.example.com/{}.mp3", id)))
        .collect()
}

pub async fn start_local() -> (PlaybackController, Arc<FakeEngineFactory>) {
    let factory = Arc::new(FakeEngineFactory::default());
    let controller = PlaybackController::builder(Arc::new(LocalConnector::new(factory.clone())))
        .start()
        .await
        .expect("controller should start");
    (controller, factory)
}

/// Everything buffered on `stream` right now.
pub fn drain(stream: &mut EventStream) -> Vec<CoreEvent> {
    std::iter::from_fn(|| stream.try_recv().and_then(|r| r.ok())).collect()
}

pub fn playback_events(stream: &mut EventStream) -> Vec<PlaybackEvent> {
    drain(stream)
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Playback(event) => Some(event),
            _ => None,
        })
        .collect()
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
