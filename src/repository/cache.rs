//! In-memory locator cache with TTL expiry and LRU eviction.
//!
//! Entries are snapshots of [`ElementRecord`]s, never the source of truth:
//! the repository may invalidate them at any time and readers must fall back
//! to the authoritative map on a miss.
//!
//! TTL is absolute from insertion (a hit does not extend an entry's life).
//! Expired entries are evicted lazily on access. Eviction order is strict
//! LRU: every access stamps the entry with a monotonically increasing touch
//! sequence, so the victim is always uniquely determined.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::config::CacheConfig;
use crate::repository::types::ElementRecord;

struct CacheEntry {
    record: ElementRecord,
    inserted_at: Instant,
    /// Touch sequence at last access; smallest value is the LRU victim.
    touched: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.touched)
            .map(|(name, _)| name.clone());
        if let Some(name) = victim {
            debug!(element = %name, "evicting least recently used cache entry");
            self.entries.remove(&name);
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    /// hits / max(hits + misses, 1).
    pub hit_ratio: f64,
}

/// Bounded snapshot cache keyed by element name.
///
/// Internally synchronized; no lock is ever held across an `.await`.
pub struct LocatorCache {
    max_entries: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl LocatorCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            ttl: config.ttl,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Look up a cached record. Expired entries count as misses and are
    /// removed on the spot.
    pub fn get(&self, element_name: &str) -> Option<ElementRecord> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let expired = inner
            .entries
            .get(element_name)
            .map(|entry| entry.inserted_at.elapsed() > self.ttl);

        match expired {
            None => {
                inner.misses += 1;
                None
            }
            Some(true) => {
                inner.entries.remove(element_name);
                inner.misses += 1;
                None
            }
            Some(false) => {
                inner.hits += 1;
                let touch = inner.tick();
                let entry = inner.entries.get_mut(element_name)?;
                entry.touched = touch;
                Some(entry.record.clone())
            }
        }
    }

    /// Insert or overwrite a snapshot. Evicts the LRU entry first when a new
    /// key would exceed capacity.
    pub fn put(&self, element_name: &str, record: ElementRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(element_name) {
            inner.evict_lru();
        }

        let touched = inner.tick();
        inner.entries.insert(
            element_name.to_string(),
            CacheEntry {
                record,
                inserted_at: Instant::now(),
                touched,
            },
        );
    }

    /// Unconditional removal; absent keys are fine.
    pub fn invalidate(&self, element_name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(element_name);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, element_name: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.contains_key(element_name)
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let requests = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_entries: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
            hits: inner.hits,
            misses: inner.misses,
            hit_ratio: inner.hits as f64 / requests.max(1) as f64,
        }
    }
}
