//! In-memory TTL cache for engine results and raw fetch payloads.
//!
//! Keys are `(owner, semantic_key)` pairs — typically the engine id plus a
//! key describing what was cached. Entries past their TTL are treated as
//! misses on read and never returned stale; expired entries are evicted
//! lazily on read or explicitly via [`TtlCache::evict_expired`].

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Cache key: owner (usually an engine id) + semantic key.
pub type CacheKey = (String, String);

struct CacheEntry<T> {
    payload: T,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.inserted_at < self.ttl
    }
}

/// Generic TTL cache with hit/miss accounting.
pub struct TtlCache<T> {
    entries: HashMap<CacheKey, CacheEntry<T>>,
    hits: u64,
    misses: u64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a fresh entry. An expired entry counts as a miss and is
    /// removed so stale payloads can never be observed.
    pub fn get(&mut self, owner: &str, semantic_key: &str) -> Option<T> {
        let key = (owner.to_string(), semantic_key.to_string());
        let now = Utc::now();

        match self.entries.get(&key) {
            Some(entry) if entry.is_fresh(now) => {
                self.hits += 1;
                Some(entry.payload.clone())
            }
            Some(_) => {
                self.entries.remove(&key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, owner: &str, semantic_key: &str, payload: T, ttl_ms: u64) {
        self.entries.insert(
            (owner.to_string(), semantic_key.to_string()),
            CacheEntry {
                payload,
                inserted_at: Utc::now(),
                ttl: Duration::milliseconds(ttl_ms as i64),
            },
        );
    }

    /// Drop a specific entry regardless of freshness.
    pub fn invalidate(&mut self, owner: &str, semantic_key: &str) {
        self.entries
            .remove(&(owner.to_string(), semantic_key.to_string()));
    }

    /// Remove all expired entries.
    pub fn evict_expired(&mut self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| entry.is_fresh(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Reset hit/miss counters (per-cycle accounting).
    pub fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Insert with an explicit insertion timestamp. Lets tests exercise TTL
    /// boundaries without sleeping.
    #[cfg(test)]
    fn insert_at(
        &mut self,
        owner: &str,
        semantic_key: &str,
        payload: T,
        ttl_ms: u64,
        inserted_at: DateTime<Utc>,
    ) {
        self.entries.insert(
            (owner.to_string(), semantic_key.to_string()),
            CacheEntry {
                payload,
                inserted_at,
                ttl: Duration::milliseconds(ttl_ms as i64),
            },
        );
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
