//! Process-wide cache store slots.
//!
//! Only one [`CacheStore`] may index a given cache directory at a time. The
//! registry hands every service built over the same directory a clone of the
//! same store and forgets it again once the store is dropped.

use core_playback::{CacheConfig, CacheStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::error::Result;

#[derive(Default)]
pub struct CacheRegistry {
    stores: Mutex<HashMap<String, CacheStore>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every service in this process.
    pub fn global() -> Arc<CacheRegistry> {
        static GLOBAL: OnceLock<Arc<CacheRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(CacheRegistry::new())).clone()
    }

    /// Return the store registered under `id`, building it with `init` on
    /// first use. A store that was dropped is replaced.
    pub fn get_or_init(
        &self,
        id: &str,
        init: impl FnOnce() -> core_playback::Result<CacheStore>,
    ) -> Result<CacheStore> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(id) {
            if !store.is_released() {
                debug!(cache = %id, "Reusing registered cache store");
                return Ok(store.clone());
            }
        }

        let store = init()?;
        stores.insert(id.to_string(), store.clone());
        info!(cache = %id, "Registered cache store");
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Option<CacheStore> {
        self.stores.lock().get(id).cloned()
    }

    /// Drop every span of the store under `id` and forget it. Returns the
    /// bytes released.
    pub fn drop_all(&self, id: &str) -> u64 {
        let store = self.stores.lock().remove(id);
        store.map_or(0, |store| store.drop_all())
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry id for a cache rooted at `dir` with `config`.
pub(crate) fn cache_id(dir: Option<&std::path::Path>, config: &CacheConfig) -> String {
    match dir {
        Some(dir) => dir.display().to_string(),
        None => format!("memory:{}", config.max_cache_size_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::time::ManualClock;
    use bridge_traits::{SpanStorage, StoredRange};
    use bytes::Bytes;

    struct NullStorage;

    impl SpanStorage for NullStorage {
        fn read(&self, _key: &str, _offset: u64, _length: u64) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }
        fn write(&self, _key: &str, _offset: u64, _data: &[u8]) -> BridgeResult<()> {
            Ok(())
        }
        fn remove_span(&self, _key: &str, _offset: u64) -> BridgeResult<()> {
            Ok(())
        }
        fn cached_spans(&self, _key: &str) -> BridgeResult<Vec<StoredRange>> {
            Ok(Vec::new())
        }
        fn release(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn build() -> core_playback::Result<CacheStore> {
        CacheStore::initialize(
            CacheConfig::new().with_max_size(1_000).with_max_span_bytes(100),
            Arc::new(NullStorage),
            Arc::new(ManualClock::new(0)),
            None,
        )
    }

    #[test]
    fn test_same_id_shares_one_store() {
        let registry = CacheRegistry::new();
        let first = registry.get_or_init("/tmp/cache", build).unwrap();
        first.on_span_added(first.new_span("k", 0, 10));

        let second = registry
            .get_or_init("/tmp/cache", || panic!("store should be reused"))
            .unwrap();
        assert_eq!(second.current_size(), 10);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_drop_all_forgets_store() {
        let registry = CacheRegistry::new();
        let store = registry.get_or_init("a", build).unwrap();
        store.on_span_added(store.new_span("k", 0, 10));

        assert_eq!(registry.drop_all("a"), 10);
        assert!(registry.is_empty());
        assert!(store.is_released());
        assert_eq!(registry.drop_all("a"), 0);

        let fresh = registry.get_or_init("a", build).unwrap();
        assert!(!fresh.is_released());
    }

    #[test]
    fn test_cache_id_prefers_directory() {
        let config = CacheConfig::new().with_max_size(5);
        assert_eq!(
            cache_id(Some(std::path::Path::new("/var/cache/media")), &config),
            "/var/cache/media"
        );
        assert_eq!(cache_id(None, &config), "memory:5");
    }
}
