#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use types::{CacheEntry, CacheValue};

/// Atomic counters backing `stats()`. Cheap to read under load since every
/// field is a separate `AtomicU64`, no lock needed for a snapshot.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

/// Plain-data read of the counters above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide TTL table keyed by the composite string
/// `device_id:register_type:address:count`. Entries are evicted lazily on
/// `get`; there is no background sweep since the poller's own cycle cadence
/// already bounds how stale a dead key can get before the next write.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl_seconds: i64,
    stats: CacheStats,
}

impl TtlCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_seconds: ttl_seconds as i64,
            stats: CacheStats::default(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !entry.is_expired(self.ttl_seconds, now) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(self.ttl_seconds, now) {
                entries.remove(key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "evicted expired cache entry");
                return None;
            }
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.clone());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, key: String, value: CacheValue) {
        let entry = CacheEntry::new(value, Utc::now());
        self.entries.write().await.insert(key, entry);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Keys belonging to one device: composite keys are prefixed with
    /// `{device_id}:`, so this is a straightforward filter.
    pub async fn device_keys(&self, device_id: &str) -> Vec<String> {
        let prefix = format!("{device_id}:");
        self.entries
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache = TtlCache::new(60);
        cache.set("d1:holding:0:5".to_string(), CacheValue::Registers(vec![1, 2, 3])).await;
        let entry = cache.get("d1:holding:0:5").await;
        assert!(entry.is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn miss_on_absent_key() {
        let cache = TtlCache::new(60);
        assert!(cache.get("nope").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_evicts_on_get() {
        let cache = TtlCache::new(0);
        cache.set("k".to_string(), CacheValue::Registers(vec![1])).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn device_keys_filters_by_prefix() {
        let cache = TtlCache::new(60);
        cache.set("d1:holding:0:5".to_string(), CacheValue::Registers(vec![1])).await;
        cache.set("d2:holding:0:5".to_string(), CacheValue::Registers(vec![2])).await;
        let keys = cache.device_keys("d1").await;
        assert_eq!(keys, vec!["d1:holding:0:5".to_string()]);
    }

    #[tokio::test]
    async fn invalidate_removes_single_key() {
        let cache = TtlCache::new(60);
        cache.set("k".to_string(), CacheValue::Registers(vec![1])).await;
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }
}
