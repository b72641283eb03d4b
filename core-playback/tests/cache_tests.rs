//! Media cache tests: the caching data source on top of the span store.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::ManualClock;
use bridge_traits::{DataSource, DataSourceFactory, DataSpec, SpanStorage, StoredRange};
use bytes::Bytes;
use core_playback::{CacheConfig, CacheStore, CachingDataSourceFactory};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const TRACK_A: &str = "https://cdn.example.com/a.mp3";
const TRACK_B: &str = "https://cdn.example.com/b.mp3";
const TRACK_LEN: usize = 2_000;

#[derive(Default)]
struct MemoryStorage {
    spans: Mutex<BTreeMap<(String, u64), Vec<u8>>>,
    released: AtomicBool,
}

impl SpanStorage for MemoryStorage {
    fn read(&self, key: &str, offset: u64, length: u64) -> BridgeResult<Bytes> {
        let spans = self.spans.lock();
        for ((k, start), data) in spans.iter() {
            let end = start + data.len() as u64;
            if k == key && offset >= *start && offset < end {
                let from = (offset - start) as usize;
                let to = (from + length as usize).min(data.len());
                return Ok(Bytes::copy_from_slice(&data[from..to]));
            }
        }
        Ok(Bytes::new())
    }

    fn write(&self, key: &str, offset: u64, data: &[u8]) -> BridgeResult<()> {
        self.spans
            .lock()
            .insert((key.to_string(), offset), data.to_vec());
        Ok(())
    }

    fn remove_span(&self, key: &str, offset: u64) -> BridgeResult<()> {
        self.spans.lock().remove(&(key.to_string(), offset));
        Ok(())
    }

    fn cached_spans(&self, key: &str) -> BridgeResult<Vec<StoredRange>> {
        Ok(self
            .spans
            .lock()
            .iter()
            .filter(|((k, _), _)| k == key)
            .map(|((_, offset), data)| StoredRange::new(*offset, data.len() as u64))
            .collect())
    }

    fn keys(&self) -> BridgeResult<Vec<String>> {
        let mut keys: Vec<String> = self.spans.lock().keys().map(|(k, _)| k.clone()).collect();
        keys.dedup();
        Ok(keys)
    }

    fn release(&self) -> BridgeResult<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Storage where a competing commit for the same key lands while a write is
/// still in flight.
#[derive(Default)]
struct RacingStorage {
    inner: MemoryStorage,
    rival: Mutex<Option<(CacheStore, u64)>>,
}

impl SpanStorage for RacingStorage {
    fn read(&self, key: &str, offset: u64, length: u64) -> BridgeResult<Bytes> {
        self.inner.read(key, offset, length)
    }

    fn write(&self, key: &str, offset: u64, data: &[u8]) -> BridgeResult<()> {
        let rival = self.rival.lock().take();
        if let Some((store, rival_offset)) = rival {
            assert!(store.commit_span(key, rival_offset, &[9u8; 100]).unwrap());
        }
        self.inner.write(key, offset, data)
    }

    fn remove_span(&self, key: &str, offset: u64) -> BridgeResult<()> {
        self.inner.remove_span(key, offset)
    }

    fn cached_spans(&self, key: &str) -> BridgeResult<Vec<StoredRange>> {
        self.inner.cached_spans(key)
    }

    fn keys(&self) -> BridgeResult<Vec<String>> {
        self.inner.keys()
    }

    fn release(&self) -> BridgeResult<()> {
        self.inner.release()
    }
}

fn content_of(uri: &str) -> Vec<u8> {
    let seed = uri.len() as u8;
    (0..TRACK_LEN)
        .map(|i| (i % 251) as u8 ^ seed)
        .collect()
}

/// Network stand-in: every URI serves [`TRACK_LEN`] bytes.
struct Upstream {
    served: Arc<AtomicU64>,
    content: Vec<u8>,
    cursor: usize,
    end: usize,
}

impl DataSource for Upstream {
    fn open(&mut self, spec: &DataSpec) -> BridgeResult<Option<u64>> {
        self.content = content_of(&spec.uri);
        self.cursor = spec.position as usize;
        self.end = match spec.length {
            Some(length) => (self.cursor + length as usize).min(TRACK_LEN),
            None => TRACK_LEN,
        };
        Ok(Some((self.end - self.cursor) as u64))
    }

    fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        let n = buf.len().min(self.end - self.cursor);
        buf[..n].copy_from_slice(&self.content[self.cursor..self.cursor + n]);
        self.cursor += n;
        self.served.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn close(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct UpstreamFactory {
    served: Arc<AtomicU64>,
}

impl DataSourceFactory for UpstreamFactory {
    fn create_data_source(&self) -> Box<dyn DataSource> {
        Box::new(Upstream {
            served: self.served.clone(),
            content: Vec::new(),
            cursor: 0,
            end: 0,
        })
    }
}

struct Harness {
    factory: CachingDataSourceFactory,
    storage: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
    served: Arc<AtomicU64>,
    events: EventBus,
}

fn harness(max_bytes: u64, max_span_bytes: u64) -> Harness {
    let storage = Arc::new(MemoryStorage::default());
    let clock = Arc::new(ManualClock::new(0));
    let events = EventBus::new(256);
    let upstream = Arc::new(UpstreamFactory::default());
    let served = upstream.served.clone();
    let store = CacheStore::initialize(
        CacheConfig::new()
            .with_max_size(max_bytes)
            .with_max_span_bytes(max_span_bytes),
        storage.clone(),
        clock.clone(),
        Some(events.clone()),
    )
    .unwrap();

    Harness {
        factory: CachingDataSourceFactory::new(upstream, store),
        storage,
        clock,
        served,
        events,
    }
}

fn stream(factory: &CachingDataSourceFactory, spec: &DataSpec) -> Vec<u8> {
    let mut source = factory.create_data_source();
    source.open(spec).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = source.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    source.close().unwrap();
    out
}

fn cache_events(events: &mut core_runtime::events::EventStream) -> Vec<CacheEvent> {
    std::iter::from_fn(|| events.try_recv().and_then(|r| r.ok()))
        .filter_map(|event| match event {
            CoreEvent::Cache(event) => Some(event),
            _ => None,
        })
        .collect()
}

#[test]
fn test_replay_is_served_from_cache() {
    let h = harness(10_000, 1_000);

    let first = stream(&h.factory, &DataSpec::new(TRACK_A));
    let second = stream(&h.factory, &DataSpec::new(TRACK_A));

    assert_eq!(first, content_of(TRACK_A));
    assert_eq!(second, first);
    assert_eq!(h.served.load(Ordering::SeqCst), TRACK_LEN as u64);

    let stats = h.factory.store().stats();
    assert_eq!(stats.span_count, 2);
    assert_eq!(stats.key_count, 1);
    assert_eq!(stats.total_bytes, TRACK_LEN as u64);
}

#[test]
fn test_new_track_evicts_least_recently_used_span() {
    let h = harness(3_000, 1_000);
    let mut events = h.events.stream();

    stream(&h.factory, &DataSpec::new(TRACK_A));
    h.clock.advance(10);
    stream(&h.factory, &DataSpec::new(TRACK_B));

    let store = h.factory.store();
    assert_eq!(store.current_size(), 3_000);
    let a: Vec<u64> = store.spans_for_key(TRACK_A).iter().map(|s| s.offset).collect();
    assert_eq!(a, vec![1_000]);
    assert_eq!(store.cached_bytes(TRACK_B), 2_000);
    assert!(!h.storage.spans.lock().contains_key(&(TRACK_A.to_string(), 0)));

    let evicted: Vec<CacheEvent> = cache_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, CacheEvent::SpanEvicted { .. }))
        .collect();
    assert_eq!(
        evicted,
        vec![CacheEvent::SpanEvicted {
            key: TRACK_A.to_string(),
            offset: 0,
            length: 1_000,
        }]
    );
}

#[test]
fn test_reading_a_span_refreshes_its_recency() {
    let h = harness(3_000, 1_000);

    stream(&h.factory, &DataSpec::new(TRACK_A));
    h.clock.advance(10);
    let head = stream(&h.factory, &DataSpec::new(TRACK_A).with_range(0, Some(500)));
    assert_eq!(head, content_of(TRACK_A)[..500]);

    h.clock.advance(10);
    stream(&h.factory, &DataSpec::new(TRACK_B));

    let a: Vec<u64> = h
        .factory
        .store()
        .spans_for_key(TRACK_A)
        .iter()
        .map(|s| s.offset)
        .collect();
    assert_eq!(a, vec![0]);
}

#[test]
fn test_store_restores_index_from_storage() {
    let h = harness(10_000, 1_000);
    stream(&h.factory, &DataSpec::new(TRACK_A));
    stream(&h.factory, &DataSpec::new(TRACK_B).with_range(0, Some(700)));
    let before = h.factory.store().stats();

    let reopened = CacheStore::initialize(
        CacheConfig::new().with_max_size(10_000).with_max_span_bytes(1_000),
        h.storage.clone(),
        h.clock.clone(),
        None,
    )
    .unwrap();

    assert_eq!(reopened.stats(), before);
    assert_eq!(reopened.cached_bytes(TRACK_B), 700);
    assert!(reopened.find_span(TRACK_A, 1_500).is_some());
}

#[test]
fn test_restore_over_smaller_budget_evicts() {
    let h = harness(10_000, 1_000);
    stream(&h.factory, &DataSpec::new(TRACK_A));
    stream(&h.factory, &DataSpec::new(TRACK_B));

    let reopened = CacheStore::initialize(
        CacheConfig::new().with_max_size(2_500).with_max_span_bytes(1_000),
        h.storage.clone(),
        h.clock.clone(),
        None,
    )
    .unwrap();

    assert!(reopened.current_size() <= 2_500);
    assert_eq!(h.storage.spans.lock().len(), reopened.stats().span_count);
}

#[test]
fn test_invalidating_a_key_forces_refetch() {
    let h = harness(10_000, 1_000);
    stream(&h.factory, &DataSpec::new(TRACK_A));
    stream(&h.factory, &DataSpec::new(TRACK_B));

    assert_eq!(h.factory.store().evict_all_for_key(TRACK_A), 2);
    assert_eq!(h.factory.store().cached_bytes(TRACK_A), 0);
    assert_eq!(h.factory.store().cached_bytes(TRACK_B), 2_000);

    stream(&h.factory, &DataSpec::new(TRACK_A));
    assert_eq!(h.served.load(Ordering::SeqCst), 3 * TRACK_LEN as u64);
}

#[test]
fn test_drop_all_releases_storage_and_stops_caching() {
    let h = harness(10_000, 1_000);
    let mut events = h.events.stream();
    stream(&h.factory, &DataSpec::new(TRACK_A));

    assert_eq!(h.factory.store().drop_all(), TRACK_LEN as u64);
    assert!(h.storage.released.load(Ordering::SeqCst));
    assert!(h.storage.spans.lock().is_empty());
    assert!(cache_events(&mut events).contains(&CacheEvent::Cleared {
        released_bytes: TRACK_LEN as u64
    }));

    let bytes = stream(&h.factory, &DataSpec::new(TRACK_B));
    assert_eq!(bytes, content_of(TRACK_B));
    assert_eq!(h.factory.store().current_size(), 0);
}

#[test]
fn test_overlapping_commit_landing_mid_write_is_discarded() {
    let storage = Arc::new(RacingStorage::default());
    let store = CacheStore::initialize(
        CacheConfig::new()
            .with_max_size(10_000)
            .with_max_span_bytes(1_000),
        storage.clone(),
        Arc::new(ManualClock::new(0)),
        None,
    )
    .unwrap();
    *storage.rival.lock() = Some((store.clone(), 50));

    assert!(!store.commit_span(TRACK_A, 0, &[1u8; 100]).unwrap());

    let spans = store.spans_for_key(TRACK_A);
    assert_eq!(spans.len(), 1);
    assert_eq!((spans[0].offset, spans[0].length), (50, 100));
    assert_eq!(store.current_size(), 100);
    let stored: Vec<u64> = storage
        .inner
        .spans
        .lock()
        .keys()
        .map(|(_, offset)| *offset)
        .collect();
    assert_eq!(stored, vec![50]);
}

#[test]
fn test_span_operations_from_many_threads_keep_index_consistent() {
    let budget = 4_000;
    let clock = Arc::new(ManualClock::new(0));
    let store = CacheStore::initialize(
        CacheConfig::new()
            .with_max_size(budget)
            .with_max_span_bytes(1_000),
        Arc::new(MemoryStorage::default()),
        clock.clone(),
        None,
    )
    .unwrap();
    let keys = [TRACK_A, TRACK_B, "https://cdn.example.com/c.mp3"];

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let store = store.clone();
            let clock = clock.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker);
                for step in 0..500i64 {
                    clock.set(step);
                    let key = keys[rng.random_range(0..keys.len())];
                    let offset = rng.random_range(0..10u64) * 50;
                    match rng.random_range(0..4) {
                        0 => {
                            store.commit_span(key, offset, &[worker as u8; 100]).unwrap();
                        }
                        1 => {
                            if let Some(span) = store.find_span(key, offset) {
                                store.read_span(&span, span.offset, span.length).unwrap();
                            }
                        }
                        2 => {
                            if let Some(span) = store.find_span(key, offset) {
                                store.on_span_removed(&span);
                            }
                        }
                        _ => {
                            store.reserve(rng.random_range(0..500));
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let spans = store.spans_by_recency();
    let sum: u64 = spans.iter().map(|span| span.length).sum();
    assert_eq!(store.current_size(), sum);
    assert!(store.current_size() <= budget);
    for key in keys {
        let spans = store.spans_for_key(key);
        for pair in spans.windows(2) {
            assert!(pair[0].end() <= pair[1].offset, "overlap in {:?}", pair);
        }
    }
}
