//! Byte-bounded LRU cache with lazy TTL
//!
//! Lookups take `&self` so callers can hold a shared read lock while
//! probing. Recency is tracked with atomics; expired entries are reported
//! as [`Lookup::Expired`] and removed by the next writer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Limits for an [`LruCache`]
#[derive(Debug, Clone)]
pub struct LruCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Maximum total size in bytes
    pub max_bytes: usize,
    /// Entry lifetime (None = no expiry)
    pub ttl: Option<Duration>,
}

impl Default for LruCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_bytes: usize::MAX,
            ttl: None,
        }
    }
}

impl LruCacheConfig {
    pub fn with_limits(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
            ttl: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Result of a shared-access lookup
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a, V> {
    Fresh(&'a V),
    Expired,
    Missing,
}

/// Result of an insert
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome<K> {
    /// Stored; lists keys evicted to make room (oldest first)
    Stored { evicted: Vec<K> },
    /// Entry alone exceeds the byte limit
    Rejected,
}

#[derive(Debug)]
struct LruEntry<V> {
    value: V,
    last_access: AtomicU64,
    created_at: Instant,
    size_bytes: usize,
}

#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    config: LruCacheConfig,
    /// Monotonic access clock for recency ordering
    clock: AtomicU64,
    current_bytes: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruCacheConfig::with_limits(capacity, usize::MAX))
    }

    pub fn with_config(config: LruCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock: AtomicU64::new(0),
            current_bytes: 0,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn is_stale(&self, entry: &LruEntry<V>) -> bool {
        self.config
            .ttl
            .is_some_and(|ttl| entry.created_at.elapsed() >= ttl)
    }

    /// Look up a key and mark it as recently used
    pub fn lookup(&self, key: &K) -> Lookup<'_, V> {
        match self.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if self.is_stale(entry) => Lookup::Expired,
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                Lookup::Fresh(&entry.value)
            }
        }
    }

    /// Fresh value without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| !self.is_stale(e))
            .map(|e| &e.value)
    }

    /// Mutable access to a fresh value (marks it as recently used)
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let now = self.tick();
        let ttl = self.config.ttl;
        let entry = self.entries.get_mut(key)?;
        if ttl.is_some_and(|ttl| entry.created_at.elapsed() >= ttl) {
            return None;
        }
        *entry.last_access.get_mut() = now;
        Some(&mut entry.value)
    }

    /// Insert or replace a value of known size
    ///
    /// Evicts least recently used entries until both the entry and byte
    /// limits hold. An entry larger than the byte limit is rejected and the
    /// cache is left untouched.
    pub fn insert(&mut self, key: K, value: V, size_bytes: usize) -> InsertOutcome<K> {
        if size_bytes > self.config.max_bytes || self.config.max_entries == 0 {
            return InsertOutcome::Rejected;
        }

        self.remove(&key);

        let mut evicted = Vec::new();
        while !self.entries.is_empty()
            && (self.entries.len() >= self.config.max_entries
                || self.current_bytes + size_bytes > self.config.max_bytes)
        {
            match self.evict_lru() {
                Some(k) => evicted.push(k),
                None => break,
            }
        }

        self.current_bytes += size_bytes;
        self.entries.insert(
            key,
            LruEntry {
                value,
                last_access: AtomicU64::new(self.tick()),
                created_at: Instant::now(),
                size_bytes,
            },
        );

        InsertOutcome::Stored { evicted }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| {
            self.current_bytes = self.current_bytes.saturating_sub(e.size_bytes);
            e.value
        })
    }

    /// Keep only entries matching the predicate, returning removed keys
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<K>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, e)| !keep(k, &e.value))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        if self.config.ttl.is_none() {
            return 0;
        }
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| self.is_stale(e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        stale.len()
    }

    /// Iterate fresh entries (no recency update)
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter(|(_, e)| !self.is_stale(e))
            .map(|(k, e)| (k, &e.value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    fn evict_lru(&mut self) -> Option<K> {
        let key = self.find_lru_key()?;
        self.remove(&key);
        Some(key)
    }

    fn find_lru_key(&self) -> Option<K> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone())
    }
}
