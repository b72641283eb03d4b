//! Read-through caching data source.
//!
//! Reads are served from [`CacheStore`] spans where they exist and from the
//! upstream source otherwise. Upstream bytes are buffered and committed as new
//! spans, clipped at the start of the next cached span so spans of one key
//! never overlap. Cache failures only cost the cache, never the read.

use crate::cache::store::{CacheSpan, CacheStore};
use bridge_traits::error::Result;
use bridge_traits::{DataSource, DataSourceFactory, DataSpec};
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps an upstream factory so every source it creates reads through the cache.
pub struct CachingDataSourceFactory {
    upstream: Arc<dyn DataSourceFactory>,
    store: CacheStore,
}

impl CachingDataSourceFactory {
    pub fn new(upstream: Arc<dyn DataSourceFactory>, store: CacheStore) -> Self {
        Self { upstream, store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl DataSourceFactory for CachingDataSourceFactory {
    fn create_data_source(&self) -> Box<dyn DataSource> {
        Box::new(CachingDataSource::new(
            self.upstream.create_data_source(),
            self.store.clone(),
        ))
    }
}

enum Segment {
    /// Nothing open at the current position.
    None,
    /// Local resource, passed straight through.
    Bypass,
    Cached {
        bytes: Bytes,
    },
    Upstream {
        /// Offset of the first byte in `pending`.
        write_offset: u64,
        pending: BytesMut,
        /// Where caching stops: the next cached span, if any.
        limit: Option<u64>,
    },
}

pub struct CachingDataSource {
    upstream: Box<dyn DataSource>,
    store: CacheStore,
    spec: Option<DataSpec>,
    segment: Segment,
    upstream_open: bool,
    position: u64,
    remaining: Option<u64>,
}

impl CachingDataSource {
    pub fn new(upstream: Box<dyn DataSource>, store: CacheStore) -> Self {
        Self {
            upstream,
            store,
            spec: None,
            segment: Segment::None,
            upstream_open: false,
            position: 0,
            remaining: None,
        }
    }

    fn key(&self) -> &str {
        self.spec.as_ref().map_or("", |spec| spec.key.as_str())
    }

    /// Open whatever serves `self.position`: a cached span or upstream.
    fn open_segment(&mut self) -> Result<Option<u64>> {
        let key = self.key().to_string();

        if let Some(span) = self.store.find_span(&key, self.position) {
            let mut length = span.end() - self.position;
            if let Some(remaining) = self.remaining {
                length = length.min(remaining);
            }
            match self.store.read_span(&span, self.position, length) {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(key = %key, position = self.position, length, "Cache hit");
                    self.segment = Segment::Cached { bytes };
                    return Ok(None);
                }
                Ok(_) => self.forget(&span),
                Err(e) => {
                    warn!(key = %key, "Cached span unreadable, falling back to upstream: {}", e);
                    self.forget(&span);
                }
            }
        }

        let Some(spec) = self.spec.as_ref() else {
            return Ok(Some(0));
        };
        let upstream_spec = spec.clone().with_range(self.position, self.remaining);
        let length = self.upstream.open(&upstream_spec)?;
        self.upstream_open = true;

        self.store.on_start_file(&key, self.position, self.remaining.or(length));
        self.segment = Segment::Upstream {
            write_offset: self.position,
            pending: BytesMut::new(),
            limit: self.store.next_span_start(&key, self.position),
        };
        Ok(length)
    }

    fn forget(&self, span: &CacheSpan) {
        self.store.on_span_removed(span);
    }

    /// Commit buffered upstream bytes as a span.
    fn flush(&mut self) {
        let key = self.key().to_string();
        if let Segment::Upstream {
            write_offset,
            pending,
            ..
        } = &mut self.segment
        {
            if pending.is_empty() {
                return;
            }
            let data = pending.split().freeze();
            let offset = *write_offset;
            *write_offset += data.len() as u64;

            match self.store.commit_span(&key, offset, &data) {
                Ok(true) => {}
                Ok(false) => debug!(key = %key, offset, "Span not committed"),
                Err(e) => warn!(key = %key, offset, "Failed to cache span: {}", e),
            }
        }
    }

    fn close_segment(&mut self) -> Result<()> {
        self.flush();
        self.segment = Segment::None;
        if self.upstream_open {
            self.upstream_open = false;
            self.upstream.close()?;
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.position += n as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= n as u64;
        }
    }
}

impl DataSource for CachingDataSource {
    fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>> {
        self.close_segment()?;

        if spec.is_local() {
            let length = self.upstream.open(spec)?;
            self.upstream_open = true;
            self.segment = Segment::Bypass;
            self.spec = Some(spec.clone());
            return Ok(length);
        }

        self.spec = Some(spec.clone());
        self.position = spec.position;
        self.remaining = spec.length;
        let length = self.open_segment()?;
        Ok(spec.length.or(length))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.remaining == Some(0) {
                self.flush();
                return Ok(0);
            }
            let mut want = buf.len();
            if let Some(remaining) = self.remaining {
                want = want.min(remaining as usize);
            }

            match &mut self.segment {
                Segment::None => {
                    if self.spec.is_none() {
                        return Ok(0);
                    }
                    self.open_segment()?;
                }
                Segment::Bypass => return self.upstream.read(buf),
                Segment::Cached { bytes } => {
                    if bytes.is_empty() {
                        self.segment = Segment::None;
                        continue;
                    }
                    let n = want.min(bytes.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    bytes.advance(n);
                    self.advance(n);
                    return Ok(n);
                }
                Segment::Upstream { pending, limit, .. } => {
                    if let Some(limit) = *limit {
                        if self.position >= limit {
                            self.close_segment()?;
                            continue;
                        }
                        want = want.min((limit - self.position) as usize);
                    }
                    let max_span = self.store.config().max_span_bytes as usize;
                    want = want.min(max_span - pending.len());

                    let n = self.upstream.read(&mut buf[..want])?;
                    if n == 0 {
                        self.flush();
                        return Ok(0);
                    }
                    pending.extend_from_slice(&buf[..n]);
                    let full = pending.len() >= max_span;
                    self.advance(n);
                    if full {
                        self.flush();
                    }
                    return Ok(n);
                }
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let result = self.close_segment();
        self.spec = None;
        self.remaining = None;
        result
    }
}
