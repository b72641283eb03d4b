//! Cache statistics

use serde::{Deserialize, Serialize};

/// Point-in-time view of the span index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub span_count: usize,

    /// Distinct keys with at least one indexed span.
    pub key_count: usize,

    pub total_bytes: u64,

    pub max_bytes: u64,
}

impl CacheStats {
    pub fn usage_percentage(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_bytes as f64) * 100.0
    }

    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_bytes > self.max_bytes
    }

    /// Bytes that would have to go to get back under budget.
    pub fn space_needed(&self) -> u64 {
        self.total_bytes.saturating_sub(self.max_bytes)
    }

    pub fn available_bytes(&self) -> u64 {
        self.max_bytes.saturating_sub(self.total_bytes)
    }
}
