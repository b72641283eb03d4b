//! # Playback Controller Usage Example
//!
//! Drives a controller over a simulated engine that prepares every track
//! instantly and finishes it after a short delay, printing the events a host
//! UI would observe.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    EngineEvent, EngineEventKind, EngineListener, MediaEngine, MediaEngineFactory, MediaRequest,
};
use core_playback::{AddOptions, LocalConnector, PlaybackController, Result, Track};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Simulated engine
// ============================================================================

#[derive(Default)]
struct SimulatedEngine {
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
}

impl SimulatedEngine {
    fn notify(&self, token: u64, kind: EngineEventKind) {
        if let Some(listener) = self.listener.lock().clone() {
            listener.on_event(EngineEvent::new(token, kind));
        }
    }
}

#[async_trait]
impl MediaEngine for SimulatedEngine {
    fn set_listener(&self, listener: Arc<dyn EngineListener>) {
        *self.listener.lock() = Some(listener);
    }

    async fn prepare(&self, request: MediaRequest, token: u64) -> BridgeResult<()> {
        println!("  engine: preparing {}", request.uri);
        self.notify(token, EngineEventKind::Prepared { duration_ms: Some(50) });

        let listener = self.listener.lock().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(listener) = listener {
                listener.on_event(EngineEvent::new(token, EngineEventKind::Ended));
            }
        });
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&self, _position_ms: u64) -> BridgeResult<()> {
        Ok(())
    }

    async fn set_volume(&self, _volume: f32) -> BridgeResult<()> {
        Ok(())
    }

    async fn set_rate(&self, _rate: f32) -> BridgeResult<()> {
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        0
    }

    fn buffered_position_ms(&self) -> u64 {
        0
    }

    fn duration_ms(&self) -> Option<u64> {
        Some(50)
    }

    async fn release(&self) -> BridgeResult<()> {
        Ok(())
    }
}

struct SimulatedEngines;

impl MediaEngineFactory for SimulatedEngines {
    fn create_engine(&self) -> BridgeResult<Arc<dyn MediaEngine>> {
        Ok(Arc::new(SimulatedEngine::default()))
    }
}

// ============================================================================
// Demo
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();

    let controller = PlaybackController::builder(Arc::new(LocalConnector::new(Arc::new(
        SimulatedEngines,
    ))))
    .events(bus.clone())
    .start()
    .await?;

    let tracks = ["intro", "verse", "outro"]
        .iter()
        .map(|id| Track::new(*id, format!("https://cdn.example.com/{}.mp3", id)).with_title(*id))
        .collect();
    controller.add(tracks, AddOptions::default()).await?;
    controller.play().await?;

    while let Ok(event) = events.recv().await {
        if let CoreEvent::Playback(event) = event {
            println!("event: {:?}", event);
            if matches!(event, PlaybackEvent::QueueEnded { .. }) {
                break;
            }
        }
    }

    controller.shutdown().await?;
    Ok(())
}
