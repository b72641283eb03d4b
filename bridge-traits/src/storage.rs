//! Byte-range storage and data source abstractions.
//!
//! [`SpanStorage`] is the host's key + byte-range addressable cache store.
//! The core layers its eviction policy on top of it and never decides where
//! or how bytes are persisted.
//!
//! [`DataSource`] is the synchronous pull interface engines read media bytes
//! through. Both are called from host I/O threads, not from async tasks.

use crate::{
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A contiguous range of bytes the storage holds for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredRange {
    pub offset: u64,
    pub length: u64,
}

impl StoredRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First byte past the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.offset && position < self.end()
    }
}

/// Key + byte-range addressable storage backing the media cache.
///
/// Ranges written for the same key never overlap; callers are responsible
/// for clipping writes.
pub trait SpanStorage: PlatformSendSync {
    /// Read `length` bytes of `key` starting at `offset`.
    fn read(&self, key: &str, offset: u64, length: u64) -> Result<Bytes>;

    /// Persist `data` as a new range starting at `offset`.
    fn write(&self, key: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Delete the range of `key` starting at `offset`.
    fn remove_span(&self, key: &str, offset: u64) -> Result<()>;

    /// Ranges currently held for `key`, ordered by offset.
    fn cached_spans(&self, key: &str) -> Result<Vec<StoredRange>>;

    /// Keys holding at least one range. Used to rebuild the index on startup;
    /// storages that cannot enumerate return nothing.
    fn keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Release handles held by the storage. No further calls follow.
    fn release(&self) -> Result<()>;
}

/// Describes one read of a media resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSpec {
    pub uri: String,
    /// Cache key for the resource. Defaults to the URI.
    pub key: String,
    /// Offset of the first byte to read.
    pub position: u64,
    /// Number of bytes requested, `None` for "until the end".
    pub length: Option<u64>,
    pub headers: HashMap<String, String>,
}

impl DataSpec {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            key: uri.clone(),
            uri,
            position: 0,
            length: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_range(mut self, position: u64, length: Option<u64>) -> Self {
        self.position = position;
        self.length = length;
        self
    }

    /// `file://` URIs and bare paths are read from disk directly.
    pub fn is_local(&self) -> bool {
        self.uri.starts_with("file://") || self.uri.starts_with('/') || !self.uri.contains("://")
    }
}

/// Pull-based reader for one resource at a time.
pub trait DataSource: PlatformSend {
    /// Open `spec`. Returns the number of bytes that will be served, when known.
    fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>>;

    /// Fill `buf` and return the number of bytes read. `0` means end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn close(&mut self) -> Result<()>;
}

/// Creates data sources for an engine.
pub trait DataSourceFactory: PlatformSendSync {
    fn create_data_source(&self) -> Box<dyn DataSource>;
}
