//! Remote receiver bridge (cast devices and similar).
//!
//! The wire protocol and device discovery live in the host. The core only
//! sees a connected receiver that accepts transport commands and reports
//! progress through the same [`EngineListener`] contract as local engines.

use crate::{
    error::Result,
    platform::PlatformSendSync,
    playback::{EngineListener, MediaRequest},
};
use std::sync::Arc;

/// A remote playback device.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait RemoteReceiver: PlatformSendSync {
    /// Human readable device name used in logs.
    fn device_name(&self) -> String;

    /// Open a session with the device. Notifications for every later load
    /// are delivered to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Rejected`](crate::BridgeError::Rejected) when the
    /// device refuses the session.
    async fn connect(&self, listener: Arc<dyn EngineListener>) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Hand the device the upcoming items so it can pre-buffer. Receivers
    /// without a queue of their own may ignore it.
    async fn set_queue(&self, _items: Vec<MediaRequest>, _start_index: Option<usize>) -> Result<()> {
        Ok(())
    }

    async fn load(&self, request: MediaRequest, token: u64) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position_ms: u64) -> Result<()>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Fixed-volume devices (e.g. line-out receivers) report `false`.
    fn can_change_volume(&self) -> bool;

    fn position_ms(&self) -> u64;

    fn buffered_position_ms(&self) -> u64;

    fn duration_ms(&self) -> Option<u64>;
}
