//! Bounded LRU cache behind a single lock.
//!
//! ```text
//!   map: K -> slot index
//!
//!   head (MRU) ──► [a] ◄──► [c] ◄──► [b] ◄── tail (LRU)
//! ```
//!
//! The key map and the recency list live in one `Inner` guarded by one
//! `parking_lot::Mutex`, so every operation sees them agree. List nodes sit
//! in a slot arena addressed by index; freed slots are reused through a free
//! list.
//!
//! `get` reorders the list and therefore always takes the lock. `peek` reads
//! without touching recency.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, CapacityError};

/// A capacity-bounded cache with least-recently-used eviction.
pub struct RecencyCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

struct Entry<K, V> {
    key: K,
    value: V,
    /// Towards the MRU end.
    prev: Option<usize>,
    /// Towards the LRU end.
    next: Option<usize>,
}

struct Inner<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn entry(&self, idx: usize) -> Option<&Entry<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.entry(idx).map(|e| (e.prev, e.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(e) = self.entry_mut(p) {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.entry_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(e) = self.entry_mut(idx) {
            e.prev = None;
            e.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(e) = self.entry_mut(idx) {
            e.prev = None;
            e.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(e) = self.entry_mut(h) {
                    e.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Insert a new entry at the MRU end. The key must not be present.
    fn insert_front(&mut self, key: K, value: V) {
        let entry = Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.push_front(idx);
        self.map.insert(key, idx);
    }

    /// Unlink a slot from the list and the map, freeing it.
    fn take(&mut self, idx: usize) -> Option<Entry<K, V>> {
        self.unlink(idx);
        let entry = self.slots.get_mut(idx)?.take()?;
        self.map.remove(&entry.key);
        self.free.push(idx);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.take(idx).map(|e| (e.key, e.value))
    }

    fn walk(&self) -> impl Iterator<Item = &Entry<K, V>> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let entry = self.entry(current?)?;
            current = entry.next;
            Some(entry)
        })
    }
}

impl<K: Eq + Hash + Clone, V> RecencyCache<K, V> {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError::Zero);
        }

        debug!(capacity, "recency cache created");

        Ok(Self {
            capacity,
            inner: Mutex::new(Inner::with_capacity(capacity)),
        })
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let mut inner = self.inner.lock();
        let idx = *inner.map.get(key)?;
        inner.touch(idx);
        inner.entry(idx).map(|e| e.value.clone())
    }

    /// Look up `key` without changing recency.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let inner = self.inner.lock();
        let idx = *inner.map.get(key)?;
        inner.entry(idx).map(|e| e.value.clone())
    }

    /// Insert or update `key`, making it most recently used.
    ///
    /// Updating an existing key never evicts. Inserting a new key into a
    /// full cache evicts the least recently used entry and returns it.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.map.get(&key) {
            if let Some(entry) = inner.entry_mut(idx) {
                entry.value = value;
            }
            inner.touch(idx);
            return None;
        }

        let evicted = if inner.map.len() >= self.capacity {
            let evicted = inner.evict_lru();
            if evicted.is_some() {
                debug!(capacity = self.capacity, "evicted least recently used entry");
            }
            evicted
        } else {
            None
        };

        inner.insert_front(key, value);
        evicted
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &K) -> Result<V, CacheError> {
        let mut inner = self.inner.lock();
        let idx = *inner.map.get(key).ok_or(CacheError::NotFound)?;
        inner
            .take(idx)
            .map(|e| e.value)
            .ok_or(CacheError::NotFound)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.inner.lock().walk().map(|e| e.key.clone()).collect()
    }

    /// Entries from most to least recently used, walked from the list.
    pub fn entries_by_recency(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.inner
            .lock()
            .walk()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::with_capacity(self.capacity);
    }
}

impl<K, V> fmt::Debug for RecencyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecencyCache")
            .field("capacity", &self.capacity)
            .field("len", &self.inner.lock().map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            RecencyCache::<u64, u64>::new(0).unwrap_err(),
            CapacityError::Zero
        );
    }

    #[test]
    fn test_get_refreshes_before_eviction() {
        let cache = RecencyCache::new(2).unwrap();
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));

        let evicted = cache.set("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_update_does_not_evict() {
        let cache = RecencyCache::new(1).unwrap();
        assert_eq!(cache.set("k", 1), None);
        assert_eq!(cache.set("k", 2), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn test_remove_present_and_absent() {
        let cache = RecencyCache::new(3).unwrap();
        cache.set(1, "one");
        cache.set(2, "two");

        assert_eq!(cache.remove(&9), Err(CacheError::NotFound));
        assert_eq!(cache.keys_by_recency(), vec![2, 1]);

        assert_eq!(cache.remove(&1), Ok("one"));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.remove(&1), Err(CacheError::NotFound));
        assert_eq!(cache.keys_by_recency(), vec![2]);
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let cache = RecencyCache::new(2).unwrap();
        cache.set('x', 1);
        cache.set('y', 2);
        assert_eq!(cache.peek(&'x'), Some(1));
        assert_eq!(cache.set('z', 3), Some(('x', 1)));
    }

    #[test]
    fn test_slots_reused_after_remove() {
        let cache = RecencyCache::new(3).unwrap();
        for i in 0..3 {
            cache.set(i, i * 10);
        }
        cache.remove(&1).unwrap();
        cache.set(7, 70);
        cache.set(8, 80);

        assert_eq!(cache.keys_by_recency(), vec![8, 7, 2]);
        assert_eq!(
            cache.entries_by_recency(),
            vec![(8, 80), (7, 70), (2, 20)]
        );
        assert_eq!(cache.inner.lock().slots.len(), 3);
    }

    #[test]
    fn test_clear() {
        let cache = RecencyCache::new(2).unwrap();
        cache.set(1, 1);
        cache.set(2, 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys_by_recency().is_empty());
        cache.set(3, 3);
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_concurrent_use_stays_bounded_and_consistent() {
        let cache = Arc::new(RecencyCache::new(16).unwrap());

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..2_000u64 {
                        let key = (t * 7 + i) % 40;
                        match i % 3 {
                            0 => {
                                cache.set(key, key * 2);
                            }
                            1 => {
                                if let Some(v) = cache.get(&key) {
                                    assert_eq!(v, key * 2);
                                }
                            }
                            _ => {
                                let _ = cache.remove(&key);
                            }
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let entries = cache.entries_by_recency();
        assert!(entries.len() <= 16);
        assert_eq!(entries.len(), cache.len());
        assert!(entries.iter().all(|(k, v)| *v == k * 2));
    }
}
