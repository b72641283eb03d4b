//! # Host Bridge Traits
//!
//! Contracts between the playback core and the collaborators it does not
//! implement itself.
//!
//! ## Traits
//!
//! ### Media
//! - [`MediaEngine`](playback::MediaEngine) - On-device decode/render pipeline
//! - [`MediaEngineFactory`](playback::MediaEngineFactory) - Fresh engine per local backend
//! - [`RemoteReceiver`](remote::RemoteReceiver) - Cast-style remote device
//! - [`AudioFocus`](playback::AudioFocus) - Output focus arbitration
//!
//! ### Storage
//! - [`SpanStorage`](storage::SpanStorage) - Key + byte-range cache storage
//! - [`DataSourceFactory`](storage::DataSourceFactory) - Media byte readers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Asynchronous notifications
//!
//! Engines and receivers report progress through an
//! [`EngineListener`](playback::EngineListener). Each notification carries the
//! token of the load it belongs to, which lets the core drop completions of
//! superseded loads.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with an actionable message.

pub mod error;
pub mod log;
pub mod platform;
pub mod playback;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use log::{LogEntry, LogLevel, LoggerSink};
pub use playback::{
    AudioFocus, EngineEvent, EngineEventKind, EngineListener, MediaDescription, MediaEngine,
    MediaEngineFactory, MediaRequest, MediaType, PlaybackState,
};
pub use remote::RemoteReceiver;
pub use storage::{DataSource, DataSourceFactory, DataSpec, SpanStorage, StoredRange};
pub use time::{Clock, ManualClock, SystemClock};
