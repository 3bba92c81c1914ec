//! Bounded cache of recent ad-hoc probe results.
//!
//! Entries expire after a fixed TTL; when the cache is full the least
//! recently used entry is evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use super::models::ProbeResult;

struct CacheEntry {
    result: ProbeResult,
    inserted_at: Instant,
    last_accessed: Instant,
}

pub struct ProbeCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ProbeCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::with_capacity(capacity.min(1024))),
        }
    }

    pub fn get(&self, key: &str) -> Option<ProbeResult> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                entry.last_accessed = Instant::now();
                return Some(entry.result.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, result: ProbeResult) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let key = key.into();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);
            if entries.len() >= self.capacity {
                if let Some(lru_key) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_accessed)
                    .map(|(k, _)| k.clone())
                {
                    debug!(key = %lru_key, "Evicting least recently used probe result.");
                    entries.remove(&lru_key);
                }
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                last_accessed: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
