//! Bounded span index with least-recently-touched eviction.
//!
//! The index and the running size counter sit behind one mutex, so add,
//! touch, remove and evict are observed as whole operations by every I/O
//! thread. Storage calls made during eviction happen while that lock is held.

use crate::cache::config::CacheConfig;
use crate::cache::stats::CacheStats;
use crate::error::{PlaybackError, Result};
use bridge_traits::{Clock, SpanStorage};
use bytes::Bytes;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A contiguous cached byte range of one key.
///
/// Field order matters: the derived ordering sorts by touch time first, then
/// key and offset, which is the eviction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheSpan {
    pub last_touch_ms: i64,
    pub key: String,
    pub offset: u64,
    pub length: u64,
}

impl CacheSpan {
    pub fn new(key: impl Into<String>, offset: u64, length: u64, last_touch_ms: i64) -> Self {
        Self {
            last_touch_ms,
            key: key.into(),
            offset,
            length,
        }
    }

    /// First byte past the span.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.offset && position < self.end()
    }

    /// Same range, new touch time.
    pub fn touched(&self, last_touch_ms: i64) -> Self {
        Self {
            last_touch_ms,
            ..self.clone()
        }
    }
}

#[derive(Default)]
struct SpanIndex {
    by_recency: BTreeSet<CacheSpan>,
    by_key: HashMap<String, BTreeMap<u64, CacheSpan>>,
    current_size: u64,
    released: bool,
}

impl SpanIndex {
    fn insert(&mut self, span: CacheSpan) {
        self.remove(&span.key, span.offset);
        self.current_size += span.length;
        self.by_recency.insert(span.clone());
        self.by_key
            .entry(span.key.clone())
            .or_default()
            .insert(span.offset, span);
    }

    fn remove(&mut self, key: &str, offset: u64) -> Option<CacheSpan> {
        let spans = self.by_key.get_mut(key)?;
        let span = spans.remove(&offset)?;
        if spans.is_empty() {
            self.by_key.remove(key);
        }
        self.by_recency.remove(&span);
        self.current_size -= span.length;
        Some(span)
    }

    fn key_bytes(&self, key: &str) -> u64 {
        self.by_key
            .get(key)
            .map_or(0, |spans| spans.values().map(|s| s.length).sum())
    }

    fn overlaps(&self, key: &str, offset: u64, length: u64) -> bool {
        let end = offset + length;
        self.by_key.get(key).is_some_and(|spans| {
            spans
                .range(..end)
                .next_back()
                .is_some_and(|(_, span)| span.end() > offset)
        })
    }
}

struct CacheInner {
    config: CacheConfig,
    storage: Arc<dyn SpanStorage>,
    clock: Arc<dyn Clock>,
    events: Mutex<Vec<EventBus>>,
    index: Mutex<SpanIndex>,
}

/// Shared handle to the process media cache.
///
/// Clones share one index. Hand a clone to every local backend; the store
/// outlives any single backend and is torn down with [`CacheStore::drop_all`].
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CacheStore {
    /// Build the store and index whatever `storage` already holds.
    ///
    /// Restored spans get the current time as touch time, ordered by offset.
    #[instrument(skip(storage, clock, events))]
    pub fn initialize(
        config: CacheConfig,
        storage: Arc<dyn SpanStorage>,
        clock: Arc<dyn Clock>,
        events: Option<EventBus>,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;

        let store = Self {
            inner: Arc::new(CacheInner {
                config,
                storage,
                clock,
                events: Mutex::new(events.into_iter().collect()),
                index: Mutex::new(SpanIndex::default()),
            }),
        };
        store.restore();

        let stats = store.stats();
        info!(
            "Cache store initialized: {} spans, {} of {} bytes",
            stats.span_count, stats.total_bytes, stats.max_bytes
        );
        Ok(store)
    }

    fn restore(&self) {
        let keys = match self.inner.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to enumerate cached keys: {}", e);
                return;
            }
        };

        let now = self.now();
        let mut index = self.inner.index.lock();
        for key in keys {
            match self.inner.storage.cached_spans(&key) {
                Ok(ranges) => {
                    for range in ranges {
                        index.insert(CacheSpan::new(key.clone(), range.offset, range.length, now));
                    }
                }
                Err(e) => warn!(key = %key, "Failed to list cached spans: {}", e),
            }
        }
        let evicted = self.evict_locked(&mut index, 0);
        drop(index);
        self.emit_evicted(evicted);
    }

    /// Also publish cache events on `events`.
    ///
    /// A store shared by several players reports to each of their buses;
    /// buses stay attached for the lifetime of the store.
    pub fn attach_events(&self, events: EventBus) {
        self.inner.events.lock().push(events);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Current touch timestamp.
    pub fn now(&self) -> i64 {
        self.inner.clock.unix_timestamp_millis()
    }

    /// Span of `key` at `offset` stamped with the current time.
    pub fn new_span(&self, key: impl Into<String>, offset: u64, length: u64) -> CacheSpan {
        CacheSpan::new(key, offset, length, self.now())
    }

    // ========================================================================
    // Index notifications
    // ========================================================================

    /// Index a span the storage now holds, then evict down to budget.
    pub fn on_span_added(&self, span: CacheSpan) {
        let mut index = self.inner.index.lock();
        if index.released {
            debug!(key = %span.key, "Ignoring span added after release");
            return;
        }
        let key = span.key.clone();
        index.insert(span);
        let evicted = self.evict_locked(&mut index, 0);
        let cached_bytes = index.key_bytes(&key);
        drop(index);

        self.emit_evicted(evicted);
        self.emit(CacheEvent::SpanCached { key, cached_bytes });
    }

    /// Forget a span. Unknown spans are ignored.
    pub fn on_span_removed(&self, span: &CacheSpan) {
        let mut index = self.inner.index.lock();
        if index.remove(&span.key, span.offset).is_none() {
            debug!(key = %span.key, offset = span.offset, "Span already gone from index");
        }
    }

    /// Replace `old` with `new` as one step, refreshing recency.
    ///
    /// Does nothing when `old` is no longer indexed, so a touch racing an
    /// eviction cannot bring back a span whose bytes are gone.
    pub fn on_span_touched(&self, old: &CacheSpan, new: CacheSpan) {
        let mut index = self.inner.index.lock();
        if index.released {
            return;
        }
        if index.remove(&old.key, old.offset).is_none() {
            debug!(key = %old.key, offset = old.offset, "Touched span already evicted");
            return;
        }
        index.insert(new);
        let evicted = self.evict_locked(&mut index, 0);
        drop(index);
        self.emit_evicted(evicted);
    }

    /// A write of `length` bytes to `key` at `position` is about to start.
    pub fn on_start_file(&self, key: &str, position: u64, length: Option<u64>) {
        debug!(key = %key, position, ?length, "Starting cache write");
        if let Some(length) = length {
            self.reserve(length);
        }
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Evict least recently touched spans until `required_bytes` more fit in
    /// the budget or nothing evictable is left. Returns the bytes freed.
    ///
    /// Spans whose removal fails stay indexed and are skipped; the store may
    /// stay over budget until a later call.
    pub fn reserve(&self, required_bytes: u64) -> u64 {
        let mut index = self.inner.index.lock();
        let evicted = self.evict_locked(&mut index, required_bytes);
        drop(index);

        let freed = evicted.iter().map(|s| s.length).sum();
        self.emit_evicted(evicted);
        freed
    }

    fn evict_locked(&self, index: &mut SpanIndex, required_bytes: u64) -> Vec<CacheSpan> {
        let budget = self.inner.config.max_cache_size_bytes;
        let mut evicted = Vec::new();
        let mut skipped: HashSet<CacheSpan> = HashSet::new();

        while index.current_size.saturating_add(required_bytes) > budget {
            let Some(candidate) = index
                .by_recency
                .iter()
                .find(|span| !skipped.contains(*span))
                .cloned()
            else {
                break;
            };

            match self
                .inner
                .storage
                .remove_span(&candidate.key, candidate.offset)
            {
                Ok(()) => {
                    index.remove(&candidate.key, candidate.offset);
                    debug!(
                        key = %candidate.key,
                        offset = candidate.offset,
                        bytes = candidate.length,
                        "Evicted span"
                    );
                    evicted.push(candidate);
                }
                Err(e) => {
                    warn!(
                        key = %candidate.key,
                        offset = candidate.offset,
                        "Failed to evict span: {}",
                        e
                    );
                    skipped.insert(candidate);
                }
            }
        }

        evicted
    }

    /// Remove every span of `key`. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn evict_all_for_key(&self, key: &str) -> usize {
        let mut index = self.inner.index.lock();
        let spans: Vec<CacheSpan> = index
            .by_key
            .get(key)
            .map(|spans| spans.values().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for span in spans {
            match self.inner.storage.remove_span(&span.key, span.offset) {
                Ok(()) => {
                    index.remove(&span.key, span.offset);
                    removed += 1;
                }
                Err(e) => warn!(offset = span.offset, "Failed to remove span: {}", e),
            }
        }
        drop(index);

        info!("Evicted {} spans for key {}", removed, key);
        self.emit(CacheEvent::KeyEvicted {
            key: key.to_string(),
            spans: removed,
        });
        removed
    }

    /// Delete every span and release the storage. Later notifications are
    /// ignored. Returns the bytes that were indexed.
    #[instrument(skip(self))]
    pub fn drop_all(&self) -> u64 {
        let mut index = self.inner.index.lock();
        if index.released {
            return 0;
        }
        let released_bytes = index.current_size;
        for span in &index.by_recency {
            if let Err(e) = self.inner.storage.remove_span(&span.key, span.offset) {
                warn!(key = %span.key, offset = span.offset, "Failed to remove span: {}", e);
            }
        }
        *index = SpanIndex {
            released: true,
            ..SpanIndex::default()
        };
        drop(index);

        if let Err(e) = self.inner.storage.release() {
            warn!("Failed to release cache storage: {}", e);
        }
        info!("Cache released, {} bytes dropped", released_bytes);
        self.emit(CacheEvent::Cleared { released_bytes });
        released_bytes
    }

    // ========================================================================
    // Read-through helpers
    // ========================================================================

    /// Indexed span of `key` containing `position`.
    pub fn find_span(&self, key: &str, position: u64) -> Option<CacheSpan> {
        let index = self.inner.index.lock();
        index
            .by_key
            .get(key)?
            .range(..=position)
            .next_back()
            .map(|(_, span)| span)
            .filter(|span| span.contains(position))
            .cloned()
    }

    /// Offset of the first span of `key` starting after `position`.
    pub fn next_span_start(&self, key: &str, position: u64) -> Option<u64> {
        let index = self.inner.index.lock();
        index
            .by_key
            .get(key)?
            .range(position + 1..)
            .next()
            .map(|(&offset, _)| offset)
    }

    /// Read cached bytes and refresh the span's recency.
    pub fn read_span(&self, span: &CacheSpan, position: u64, length: u64) -> Result<Bytes> {
        let bytes = self
            .inner
            .storage
            .read(&span.key, position, length)
            .map_err(|e| PlaybackError::CacheIo(e.to_string()))?;
        self.on_span_touched(span, span.touched(self.now()));
        Ok(bytes)
    }

    /// Write `data` as a new span and index it.
    ///
    /// Returns `false` when the range overlaps an indexed span of the same
    /// key or the store was released. Overlap is checked again after the
    /// write, under the lock that indexes the span; bytes that lost that race
    /// are removed from storage again.
    pub fn commit_span(&self, key: &str, offset: u64, data: &[u8]) -> Result<bool> {
        if data.is_empty() {
            return Ok(false);
        }
        let length = data.len() as u64;
        {
            let index = self.inner.index.lock();
            if index.released || index.overlaps(key, offset, length) {
                debug!(key = %key, offset, length, "Skipping overlapping span");
                return Ok(false);
            }
        }

        self.inner
            .storage
            .write(key, offset, data)
            .map_err(|e| PlaybackError::CacheIo(e.to_string()))?;

        let span = self.new_span(key, offset, length);
        let mut index = self.inner.index.lock();
        if !index.released && !index.overlaps(key, offset, length) {
            index.insert(span);
            let evicted = self.evict_locked(&mut index, 0);
            let cached_bytes = index.key_bytes(key);
            drop(index);

            self.emit_evicted(evicted);
            self.emit(CacheEvent::SpanCached {
                key: key.to_string(),
                cached_bytes,
            });
            return Ok(true);
        }

        let same_offset = index
            .by_key
            .get(key)
            .and_then(|spans| spans.get(&offset))
            .map(|span| span.length);
        match same_offset {
            // Another writer stored these exact bytes under the same file.
            Some(indexed) if indexed == length => {}
            // The file now holds whichever write landed last; drop both.
            Some(_) => {
                index.remove(key, offset);
                self.discard_written(key, offset);
            }
            None => self.discard_written(key, offset),
        }
        debug!(key = %key, offset, length, "Span lost a concurrent commit");
        Ok(false)
    }

    fn discard_written(&self, key: &str, offset: u64) {
        if let Err(e) = self.inner.storage.remove_span(key, offset) {
            warn!(key = %key, offset, "Failed to discard unindexed span: {}", e);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn current_size(&self) -> u64 {
        self.inner.index.lock().current_size
    }

    pub fn cached_bytes(&self, key: &str) -> u64 {
        self.inner.index.lock().key_bytes(key)
    }

    /// Spans of `key` ordered by offset.
    pub fn spans_for_key(&self, key: &str) -> Vec<CacheSpan> {
        self.inner
            .index
            .lock()
            .by_key
            .get(key)
            .map(|spans| spans.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every span, least recently touched first.
    pub fn spans_by_recency(&self) -> Vec<CacheSpan> {
        self.inner.index.lock().by_recency.iter().cloned().collect()
    }

    pub fn is_released(&self) -> bool {
        self.inner.index.lock().released
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.inner.index.lock();
        CacheStats {
            span_count: index.by_recency.len(),
            key_count: index.by_key.len(),
            total_bytes: index.current_size,
            max_bytes: self.inner.config.max_cache_size_bytes,
        }
    }

    fn emit(&self, event: CacheEvent) {
        for bus in self.inner.events.lock().iter() {
            bus.emit(CoreEvent::Cache(event.clone())).ok();
        }
    }

    fn emit_evicted(&self, evicted: Vec<CacheSpan>) {
        for span in evicted {
            self.emit(CacheEvent::SpanEvicted {
                key: span.key,
                offset: span.offset,
                length: span.length,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{ManualClock, StoredRange};
    use mockall::mock;
    use mockall::predicate::eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    mock! {
        Storage {}

        impl SpanStorage for Storage {
            fn read(&self, key: &str, offset: u64, length: u64) -> BridgeResult<Bytes>;
            fn write(&self, key: &str, offset: u64, data: &[u8]) -> BridgeResult<()>;
            fn remove_span(&self, key: &str, offset: u64) -> BridgeResult<()>;
            fn cached_spans(&self, key: &str) -> BridgeResult<Vec<StoredRange>>;
            fn keys(&self) -> BridgeResult<Vec<String>>;
            fn release(&self) -> BridgeResult<()>;
        }
    }

    fn permissive_storage() -> MockStorage {
        let mut storage = MockStorage::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        storage.expect_remove_span().returning(|_, _| Ok(()));
        storage.expect_write().returning(|_, _, _| Ok(()));
        storage.expect_release().returning(|| Ok(()));
        storage
    }

    fn store_with(storage: MockStorage, budget: u64) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = CacheStore::initialize(
            CacheConfig::new().with_max_size(budget).with_max_span_bytes(budget),
            Arc::new(storage),
            clock.clone(),
            None,
        )
        .unwrap();
        (store, clock)
    }

    fn assert_size_matches_index(store: &CacheStore) {
        let sum: u64 = store.spans_by_recency().iter().map(|s| s.length).sum();
        assert_eq!(store.current_size(), sum);
    }

    #[test]
    fn test_add_accumulates_size() {
        let (store, _) = store_with(permissive_storage(), 1_000);
        store.on_span_added(CacheSpan::new("a", 0, 100, 1));
        store.on_span_added(CacheSpan::new("a", 100, 50, 2));
        store.on_span_added(CacheSpan::new("b", 0, 10, 3));

        assert_eq!(store.current_size(), 160);
        assert_eq!(store.cached_bytes("a"), 150);
        let stats = store.stats();
        assert_eq!(stats.span_count, 3);
        assert_eq!(stats.key_count, 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _) = store_with(permissive_storage(), 1_000);
        let span = CacheSpan::new("a", 0, 100, 1);
        store.on_span_added(span.clone());

        store.on_span_removed(&span);
        store.on_span_removed(&span);
        store.on_span_removed(&CacheSpan::new("missing", 0, 5, 0));

        assert_eq!(store.current_size(), 0);
        assert!(store.spans_for_key("a").is_empty());
    }

    #[test]
    fn test_eviction_order_follows_touch_time() {
        let mut storage = MockStorage::new();
        let mut seq = mockall::Sequence::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        for key in ["A", "B", "C"] {
            storage
                .expect_remove_span()
                .with(eq(key), eq(0))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }
        let (store, _) = store_with(storage, 300);

        store.on_span_added(CacheSpan::new("C", 0, 100, 3));
        store.on_span_added(CacheSpan::new("A", 0, 100, 1));
        store.on_span_added(CacheSpan::new("B", 0, 100, 2));

        assert_eq!(store.reserve(150), 200);
        assert_eq!(store.spans_by_recency()[0].key, "C");

        assert_eq!(store.reserve(300), 100);
        assert_eq!(store.current_size(), 0);
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let (store, clock) = store_with(permissive_storage(), 200);
        let a = CacheSpan::new("A", 0, 100, 1);
        store.on_span_added(a.clone());
        store.on_span_added(CacheSpan::new("B", 0, 100, 2));

        clock.set(10);
        store.on_span_touched(&a, a.touched(store.now()));
        store.on_span_added(CacheSpan::new("C", 0, 50, 11));

        let keys: Vec<String> = store.spans_by_recency().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["A", "C"]);
        assert_eq!(store.current_size(), 150);
    }

    #[test]
    fn test_touch_with_merged_length_does_not_double_count() {
        let (store, _) = store_with(permissive_storage(), 1_000);
        let old = CacheSpan::new("A", 0, 100, 1);
        store.on_span_added(old.clone());
        store.on_span_touched(&old, CacheSpan::new("A", 0, 180, 5));

        assert_eq!(store.current_size(), 180);
        assert_eq!(store.spans_for_key("A").len(), 1);
    }

    #[test]
    fn test_touch_after_eviction_does_not_resurrect_span() {
        let (store, clock) = store_with(permissive_storage(), 100);
        assert!(store.commit_span("a", 0, &[1u8; 60]).unwrap());
        let old = store.find_span("a", 0).unwrap();

        assert_eq!(store.reserve(100), 60);
        clock.set(5);
        store.on_span_touched(&old, old.touched(store.now()));

        assert_eq!(store.current_size(), 0);
        assert!(store.find_span("a", 0).is_none());
        assert_size_matches_index(&store);
    }

    #[test]
    fn test_failed_eviction_is_swallowed_and_skipped() {
        let mut storage = MockStorage::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        storage
            .expect_remove_span()
            .with(eq("A"), eq(0))
            .returning(|_, _| Err(BridgeError::OperationFailed("locked".into())));
        storage
            .expect_remove_span()
            .with(eq("B"), eq(0))
            .times(1)
            .returning(|_, _| Ok(()));
        let (store, _) = store_with(storage, 250);

        store.on_span_added(CacheSpan::new("A", 0, 100, 1));
        store.on_span_added(CacheSpan::new("B", 0, 100, 2));

        let freed = store.reserve(100);

        assert_eq!(freed, 100);
        assert_eq!(store.spans_for_key("A").len(), 1);
        assert!(store.spans_for_key("B").is_empty());
        assert_size_matches_index(&store);
    }

    #[test]
    fn test_reserve_without_evictable_spans_returns_zero() {
        let (store, _) = store_with(permissive_storage(), 100);
        assert_eq!(store.reserve(1_000), 0);
        assert_eq!(store.current_size(), 0);
    }

    #[test]
    fn test_on_start_file_reserves_known_length() {
        let (store, _) = store_with(permissive_storage(), 200);
        store.on_span_added(CacheSpan::new("old", 0, 150, 1));

        store.on_start_file("new", 0, None);
        assert_eq!(store.current_size(), 150);

        store.on_start_file("new", 0, Some(100));
        assert_eq!(store.current_size(), 0);
    }

    #[test]
    fn test_evict_all_for_key_ignores_recency() {
        let (store, _) = store_with(permissive_storage(), 1_000);
        store.on_span_added(CacheSpan::new("A", 0, 10, 1));
        store.on_span_added(CacheSpan::new("B", 0, 10, 2));
        store.on_span_added(CacheSpan::new("A", 10, 10, 3));

        assert_eq!(store.evict_all_for_key("A"), 2);
        assert_eq!(store.current_size(), 10);
        assert_eq!(store.evict_all_for_key("A"), 0);
    }

    #[test]
    fn test_drop_all_releases_storage() {
        let mut storage = MockStorage::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        storage.expect_remove_span().times(2).returning(|_, _| Ok(()));
        storage.expect_release().times(1).returning(|| Ok(()));
        let (store, _) = store_with(storage, 1_000);

        store.on_span_added(CacheSpan::new("A", 0, 10, 1));
        store.on_span_added(CacheSpan::new("B", 0, 20, 2));

        assert_eq!(store.drop_all(), 30);
        assert!(store.is_released());
        assert_eq!(store.drop_all(), 0);

        store.on_span_added(CacheSpan::new("C", 0, 5, 3));
        assert_eq!(store.current_size(), 0);
    }

    #[test]
    fn test_commit_span_writes_and_indexes() {
        let mut storage = MockStorage::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        storage
            .expect_write()
            .withf(|key, offset, data| key == "k" && *offset == 0 && data.len() == 4)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let (store, _) = store_with(storage, 1_000);

        assert!(store.commit_span("k", 0, b"abcd").unwrap());
        assert!(!store.commit_span("k", 2, b"zz").unwrap());
        assert_eq!(store.cached_bytes("k"), 4);
    }

    #[test]
    fn test_commit_span_surfaces_cache_io() {
        let mut storage = MockStorage::new();
        storage.expect_keys().returning(|| Ok(Vec::new()));
        storage
            .expect_write()
            .returning(|_, _, _| Err(BridgeError::OperationFailed("disk full".into())));
        let (store, _) = store_with(storage, 1_000);

        assert!(matches!(
            store.commit_span("k", 0, b"abcd"),
            Err(PlaybackError::CacheIo(_))
        ));
        assert_eq!(store.current_size(), 0);
    }

    #[test]
    fn test_find_span_and_next_start() {
        let (store, _) = store_with(permissive_storage(), 1_000);
        store.on_span_added(CacheSpan::new("k", 100, 50, 1));
        store.on_span_added(CacheSpan::new("k", 300, 50, 1));

        assert_eq!(store.find_span("k", 120).map(|s| s.offset), Some(100));
        assert!(store.find_span("k", 150).is_none());
        assert!(store.find_span("k", 99).is_none());
        assert_eq!(store.next_span_start("k", 150), Some(300));
        assert_eq!(store.next_span_start("k", 300), None);
        assert_eq!(store.next_span_start("other", 0), None);
    }

    #[test]
    fn test_initialize_restores_existing_spans() {
        let mut storage = MockStorage::new();
        storage
            .expect_keys()
            .returning(|| Ok(vec!["k".to_string()]));
        storage
            .expect_cached_spans()
            .with(eq("k"))
            .returning(|_| Ok(vec![StoredRange::new(0, 40), StoredRange::new(40, 60)]));
        let (store, _) = store_with(storage, 1_000);

        assert_eq!(store.current_size(), 100);
        assert_eq!(store.spans_for_key("k").len(), 2);
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let result = CacheStore::initialize(
            CacheConfig::new().with_max_size(0),
            Arc::new(permissive_storage()),
            Arc::new(ManualClock::new(0)),
            None,
        );
        assert!(matches!(result, Err(PlaybackError::Config(_))));
    }

    #[test]
    fn test_events_report_cached_bytes_per_key() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let store = CacheStore::initialize(
            CacheConfig::new().with_max_size(100).with_max_span_bytes(100),
            Arc::new(permissive_storage()),
            Arc::new(ManualClock::new(0)),
            Some(bus),
        )
        .unwrap();

        store.on_span_added(CacheSpan::new("k", 0, 30, 1));
        store.on_span_added(CacheSpan::new("k", 30, 30, 2));

        let events: Vec<CoreEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                CoreEvent::Cache(CacheEvent::SpanCached {
                    key: "k".into(),
                    cached_bytes: 30
                }),
                CoreEvent::Cache(CacheEvent::SpanCached {
                    key: "k".into(),
                    cached_bytes: 60
                }),
            ]
        );
    }

    #[test]
    fn test_size_invariant_under_random_operations() {
        for seed in 0..32u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let budget = 1_000;
            let (store, clock) = store_with(permissive_storage(), budget);
            let keys = ["a", "b", "c", "d"];

            for step in 0..300 {
                clock.set(step);
                let key = keys[rng.random_range(0..keys.len())];
                let offset = rng.random_range(0..8u64) * 100;
                match rng.random_range(0..4) {
                    0 => store.on_span_added(store.new_span(key, offset, rng.random_range(1..100))),
                    1 => store.on_span_removed(&CacheSpan::new(key, offset, 0, 0)),
                    2 => {
                        if let Some(old) = store.find_span(key, offset) {
                            store.on_span_touched(&old, old.touched(store.now()));
                        }
                    }
                    _ => {
                        let required = rng.random_range(0..300);
                        store.reserve(required);
                        assert!(store.current_size() + required <= budget);
                    }
                }
                assert_size_matches_index(&store);
                assert!(store.current_size() <= budget);
            }
        }
    }
}
