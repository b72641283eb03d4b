//! # Media Span Cache
//!
//! Bounded cache of streamed media bytes, addressed by key and byte range.
//!
//! ## Overview
//!
//! - [`CacheStore`] is the eviction policy: a span index ordered by touch
//!   time plus a running size counter, evicting least recently used spans
//!   across all keys when the byte budget is exceeded.
//! - [`CachingDataSourceFactory`] puts the store on the local backend's fetch
//!   path, serving cached ranges and recording new ones.
//! - Bytes live in a host [`SpanStorage`](bridge_traits::SpanStorage); the
//!   store never decides where or how they are persisted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  CachingDataSource           │  engine I/O thread
//! └────────┬─────────────────────┘
//!          │ find / read / commit
//! ┌────────▼─────────────────────┐
//! │  CacheStore (one mutex)      │
//! │  - on_span_added / removed   │
//! │  - on_span_touched           │
//! │  - reserve / evict_all_for_key│
//! └────────┬─────────────────────┘
//!          │
//!          └──> SpanStorage (host)
//! ```

pub mod config;
pub mod data_source;
pub mod stats;
pub mod store;

pub use config::CacheConfig;
pub use data_source::{CachingDataSource, CachingDataSourceFactory};
pub use stats::CacheStats;
pub use store::{CacheSpan, CacheStore};
