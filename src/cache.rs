//! A bounded S3-FIFO cache.
//!
//! New entries enter the small queue. An entry read more than once while in
//! small is promoted to main when small is next evicted from; anything else
//! leaves the cache and its key is remembered in the ghost queue, so that a
//! quick re-insert goes straight to main. Main is a FIFO with a second chance
//! for every read, up to `MAX_FREQUENCY_LIMIT`.

use std::{
    cmp::min,
    collections::{HashMap, VecDeque},
    fmt::Debug,
    hash::Hash,
    sync::atomic::{AtomicU8, AtomicUsize, Ordering},
};

/// Maximum frequency limit for an entry in the cache.
const MAX_FREQUENCY_LIMIT: u8 = 3;

struct Entry<V> {
    value: V,
    freq: AtomicU8,
}

impl<V> Entry<V> {
    fn new(value: V) -> Self {
        Entry {
            value,
            freq: AtomicU8::new(0),
        }
    }
}

type EvictedFn<K, V> = Box<dyn Fn(K, V) + Send>;

pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    max_small_size: usize,
    max_cache_size: usize,
    /// new entries are added to this queue
    small: VecDeque<K>,
    /// entries read more than once while in small end up here
    main: VecDeque<K>,
    /// keys recently evicted from small, no values held
    ghost: VecDeque<K>,
    /// resident entries, each queued in exactly one of small and main
    entries: HashMap<K, Entry<V>>,
    /// called with every entry evicted to make room
    evicted_fn: Option<EvictedFn<K, V>>,
    stats: Stats,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// A cache holding at most `max_cache_size` entries (at least one).
    pub fn new(max_cache_size: usize, evicted_fn: Option<EvictedFn<K, V>>) -> Self {
        let max_cache_size = max_cache_size.max(1);
        let max_small_size = (max_cache_size / 10).max(1);

        Cache {
            max_small_size,
            max_cache_size,
            small: VecDeque::new(),
            main: VecDeque::new(),
            ghost: VecDeque::new(),
            entries: HashMap::new(),
            evicted_fn,
            stats: Stats::new(),
        }
    }

    /// Returns a reference to the value of the given key if it exists in the cache.
    pub fn get(&self, key: &K) -> Option<&V> {
        if let Some(entry) = self.entries.get(key) {
            let freq = min(entry.freq.load(Ordering::SeqCst) + 1, MAX_FREQUENCY_LIMIT);
            entry.freq.store(freq, Ordering::SeqCst);
            self.stats.hit();
            Some(&entry.value)
        } else {
            self.stats.miss();
            None
        }
    }

    /// Inserts `value` under `key`, evicting older entries once the cache is
    /// full. Replacing a resident key keeps its place and frequency.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            return;
        }

        while self.entries.len() >= self.max_cache_size {
            self.evict();
        }

        if let Some(pos) = self.ghost.iter().position(|ghost| *ghost == key) {
            self.ghost.remove(pos);
            self.main.push_back(key.clone());
        } else {
            self.small.push_back(key.clone());
        }
        self.entries.insert(key, Entry::new(value));
    }

    /// Drops `key` without calling the eviction callback.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.small.retain(|k| k != key);
        self.main.retain(|k| k != key);
        Some(entry.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hits and misses seen by `get`.
    pub fn stats(&self) -> (usize, usize) {
        self.stats.get()
    }

    /// Evicts exactly one entry.
    fn evict(&mut self) {
        if (self.small.len() >= self.max_small_size || self.main.is_empty()) && self.evict_s() {
            return;
        }
        self.evict_m();
    }

    /// Returns false when every small entry was promoted instead.
    fn evict_s(&mut self) -> bool {
        while let Some(key) = self.small.pop_front() {
            let freq = match self.entries.get(&key) {
                Some(entry) => entry.freq.load(Ordering::SeqCst),
                None => continue,
            };
            if freq > 1 {
                self.main.push_back(key);
            } else {
                self.insert_g(key.clone());
                self.discard(key);
                return true;
            }
        }
        false
    }

    fn evict_m(&mut self) {
        while let Some(key) = self.main.pop_front() {
            let entry = match self.entries.get(&key) {
                Some(entry) => entry,
                None => continue,
            };
            let freq = entry.freq.load(Ordering::SeqCst);
            if freq > 0 {
                entry.freq.store(freq - 1, Ordering::SeqCst);
                self.main.push_back(key);
            } else {
                self.discard(key);
                return;
            }
        }
    }

    fn insert_g(&mut self, key: K) {
        if self.ghost.len() >= self.max_cache_size {
            self.ghost.pop_front();
        }
        self.ghost.push_back(key);
    }

    fn discard(&mut self, key: K) {
        if let Some(entry) = self.entries.remove(&key) {
            if let Some(evicted_fn) = &self.evicted_fn {
                evicted_fn(key, entry.value);
            }
        }
    }
}

struct Stats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Stats {
    fn new() -> Self {
        Stats {
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::SeqCst),
            self.misses.load(Ordering::SeqCst),
        )
    }
}
