//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SpanStorage` using one file per cached range under the user cache directory
//! - `AudioFocus` as always-granted (desktop mixers do not arbitrate output)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_cache_dir, DiskSpanStorage};
//!
//! let dir = default_cache_dir().expect("no cache directory");
//! let storage = DiskSpanStorage::new(dir)?;
//! ```

mod focus;
mod storage;

pub use focus::DesktopAudioFocus;
pub use storage::DiskSpanStorage;

use std::path::PathBuf;

const APP_DIR: &str = "track-player";

/// Per-user media cache directory, e.g. `~/.cache/track-player/media` on Linux.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("media"))
}
