//! TTL response cache
//!
//! Transport consults the cache before touching the network or the rate
//! limiter. Entries are addressed by request fingerprint and evicted
//! lazily when a lookup finds them expired.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

/// Key-value store with per-entry expiry
pub trait ResponseCache: Send + Sync {
    /// Fetch a live entry, if any
    fn get(&self, key: &str) -> Option<Value>;
    /// Store an entry with the given time-to-live
    fn set(&self, key: &str, value: Value, ttl: Duration);
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache backed by a concurrent map
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        // Guard dropped above; safe to remove the stale entry now
        self.entries.remove(key);
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}
