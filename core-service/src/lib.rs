//! Player service façade and bootstrap helpers.
//!
//! This crate wires a [`PlayerConfig`](core_runtime::config::PlayerConfig)
//! into a running playback controller: it opens (or reuses) the process-wide
//! media cache, routes the on-device engine's reads through it and exposes
//! the controller's command surface. Desktop apps typically enable the
//! `desktop-shims` feature, which supplies file-backed span storage and a
//! default cache directory from `bridge-desktop`.
//!
//! ```ignore
//! let config = PlayerConfig::builder()
//!     .engine_factory(engines)
//!     .upstream_data_source(http)
//!     .build()?;
//! let player = PlayerService::new(config).await?;
//! player.add(tracks, AddOptions::default()).await?;
//! player.play().await?;
//! ```

pub mod cache_registry;
pub mod error;
mod service;

pub use cache_registry::CacheRegistry;
pub use error::{Result, ServiceError};
pub use service::PlayerService;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{default_cache_dir, DesktopAudioFocus, DiskSpanStorage};
