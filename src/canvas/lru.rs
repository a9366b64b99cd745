//! Bounded key → entry store with least-recently-used eviction.
//!
//! Every entry that leaves the cache other than by being read goes through
//! the release callback exactly once: eviction on insert of a new key,
//! overwrite of an existing key, and [`LruCache::clear`]. The callback is the
//! only place tile bitmaps are given back, so entries are handed to it by
//! value.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

pub type ReleaseFn<K, V> = Box<dyn FnMut(&K, V)>;

pub struct LruCache<K, V> {
    entries: HashMap<K, V>,
    /// LRU order: front = oldest, back = most recently used
    order: VecDeque<K>,
    capacity: usize,
    on_release: ReleaseFn<K, V>,
}

impl<K: Clone + Eq + Hash, V> LruCache<K, V> {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize, on_release: impl FnMut(&K, V) + 'static) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            on_release: Box::new(on_release),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up and mark as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(key);
        }
        self.entries.get(key)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or replace. A replaced entry is released; inserting a new key
    /// into a full cache releases the least recently used one first.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(old) = self.entries.remove(&key) {
            self.order.retain(|k| k != &key);
            (self.on_release)(&key, old);
        } else {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else { break };
                if let Some(evicted) = self.entries.remove(&oldest) {
                    log::trace!("lru: evicting least recently used entry");
                    (self.on_release)(&oldest, evicted);
                }
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    /// Release every entry and empty the store.
    pub fn clear(&mut self) {
        self.order.clear();
        for (key, entry) in self.entries.drain() {
            (self.on_release)(&key, entry);
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("order", &self.order)
            .finish()
    }
}
