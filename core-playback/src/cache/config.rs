//! Cache configuration

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_CACHE_SIZE_BYTES: u64 = 512 * 1024 * 1024;
const DEFAULT_MAX_SPAN_BYTES: u64 = 2 * 1024 * 1024;

fn default_max_cache_size_bytes() -> u64 {
    DEFAULT_MAX_CACHE_SIZE_BYTES
}

fn default_max_span_bytes() -> u64 {
    DEFAULT_MAX_SPAN_BYTES
}

/// Settings of the media span cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget across every key.
    #[serde(default = "default_max_cache_size_bytes")]
    pub max_cache_size_bytes: u64,

    /// Upstream reads are committed to storage in spans of at most this size.
    #[serde(default = "default_max_span_bytes")]
    pub max_span_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            max_span_bytes: DEFAULT_MAX_SPAN_BYTES,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = bytes;
        self
    }

    pub fn with_max_span_bytes(mut self, bytes: u64) -> Self {
        self.max_span_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_cache_size_bytes == 0 {
            return Err("max_cache_size_bytes must be greater than 0".to_string());
        }

        if self.max_span_bytes == 0 {
            return Err("max_span_bytes must be greater than 0".to_string());
        }

        if self.max_span_bytes > self.max_cache_size_bytes {
            return Err("max_span_bytes cannot exceed max_cache_size_bytes".to_string());
        }

        Ok(())
    }
}
