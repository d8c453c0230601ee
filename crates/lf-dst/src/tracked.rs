//! Structures under test wrapped with the bookkeeping the checkers need.
//!
//! The wrappers drive the real `lf-structures` types. Tracking lives out
//! here so the structures themselves stay free of test state.

use std::collections::VecDeque;

use lf_core::invariants::{
    History, QueueProperties, RecencyCacheProperties, ReclaimProperties, RingBufferProperties,
    StackProperties,
};
use lf_structures::{AtomicQueue, AtomicStack, CapacityError, RecencyCache, RingBuffer};

/// `AtomicStack<u64>` with push/pop history.
#[derive(Debug, Default)]
pub struct TrackedStack {
    stack: AtomicStack<u64>,
    pushed: Vec<u64>,
    popped: Vec<u64>,
    history: History,
    step: u64,
}

impl TrackedStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, thread_id: u64, value: u64) {
        self.stack.push(value);
        self.step += 1;
        self.pushed.push(value);
        self.history.record_insert(thread_id, value, self.step);
    }

    pub fn pop(&mut self, thread_id: u64) -> Option<u64> {
        let value = self.stack.pop();
        self.step += 1;
        if let Some(v) = value {
            self.popped.push(v);
        }
        self.history.record_remove(thread_id, value, self.step);
        value
    }

    pub fn flush_reclamation(&self) {
        self.stack.flush_reclamation();
    }
}

impl StackProperties for TrackedStack {
    fn pushed_elements(&self) -> Vec<u64> {
        self.pushed.clone()
    }

    fn popped_elements(&self) -> Vec<u64> {
        self.popped.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.stack.snapshot()
    }

    fn history(&self) -> History {
        self.history.clone()
    }
}

impl ReclaimProperties for TrackedStack {
    fn detached_count(&self) -> u64 {
        self.popped.len() as u64
    }

    fn retired_count(&self) -> u64 {
        self.stack.reclaim_stats().retired()
    }

    fn reclaimed_count(&self) -> u64 {
        self.stack.reclaim_stats().reclaimed()
    }
}

/// `AtomicQueue<u64>` with enqueue/dequeue history.
#[derive(Debug, Default)]
pub struct TrackedQueue {
    queue: AtomicQueue<u64>,
    enqueued: Vec<u64>,
    dequeued: Vec<u64>,
    history: History,
    step: u64,
}

impl TrackedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, thread_id: u64, value: u64) {
        self.queue.enqueue(value);
        self.step += 1;
        self.enqueued.push(value);
        self.history.record_insert(thread_id, value, self.step);
    }

    pub fn dequeue(&mut self, thread_id: u64) -> Option<u64> {
        let value = self.queue.dequeue();
        self.step += 1;
        if let Some(v) = value {
            self.dequeued.push(v);
        }
        self.history.record_remove(thread_id, value, self.step);
        value
    }

    pub fn flush_reclamation(&self) {
        self.queue.flush_reclamation();
    }
}

impl QueueProperties for TrackedQueue {
    fn enqueued_elements(&self) -> Vec<u64> {
        self.enqueued.clone()
    }

    fn dequeued_elements(&self) -> Vec<u64> {
        self.dequeued.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.snapshot()
    }

    fn history(&self) -> History {
        self.history.clone()
    }
}

impl ReclaimProperties for TrackedQueue {
    fn detached_count(&self) -> u64 {
        self.dequeued.len() as u64
    }

    fn retired_count(&self) -> u64 {
        self.queue.reclaim_stats().retired()
    }

    fn reclaimed_count(&self) -> u64 {
        self.queue.reclaim_stats().reclaimed()
    }
}

/// `RingBuffer<u64>` with produced/consumed logs.
#[derive(Debug)]
pub struct TrackedRing {
    ring: RingBuffer<u64>,
    produced: Vec<u64>,
    consumed: Vec<u64>,
    rejected_lengths: Vec<u64>,
    contents: Vec<u64>,
}

impl TrackedRing {
    pub fn new(slots: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            ring: RingBuffer::new(slots)?,
            produced: Vec::new(),
            consumed: Vec::new(),
            rejected_lengths: Vec::new(),
            contents: Vec::new(),
        })
    }

    /// `true` if the buffer accepted the value.
    pub fn try_push(&mut self, value: u64) -> bool {
        let accepted = match self.ring.try_push(value) {
            Ok(()) => {
                self.produced.push(value);
                true
            }
            Err(_) => {
                self.rejected_lengths.push(self.ring.len() as u64);
                false
            }
        };
        self.contents = self.ring.snapshot();
        accepted
    }

    pub fn try_pop(&mut self) -> Option<u64> {
        let value = self.ring.try_pop();
        if let Some(v) = value {
            self.consumed.push(v);
        }
        self.contents = self.ring.snapshot();
        value
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected_lengths.len()
    }
}

impl RingBufferProperties for TrackedRing {
    fn produced_messages(&self) -> Vec<u64> {
        self.produced.clone()
    }

    fn consumed_messages(&self) -> Vec<u64> {
        self.consumed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.contents.clone()
    }

    fn capacity(&self) -> u64 {
        self.ring.capacity() as u64
    }

    fn rejected_push_lengths(&self) -> Vec<u64> {
        self.rejected_lengths.clone()
    }
}

/// Sequential LRU kept as a list, most recently used first.
#[derive(Debug, Clone)]
pub struct ReferenceLru {
    capacity: usize,
    entries: VecDeque<(u64, u64)>,
}

impl ReferenceLru {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn position(&self, key: u64) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    pub fn get(&mut self, key: u64) -> Option<u64> {
        let entry = self.entries.remove(self.position(key)?)?;
        self.entries.push_front(entry);
        Some(entry.1)
    }

    pub fn set(&mut self, key: u64, value: u64) -> Option<(u64, u64)> {
        if let Some(pos) = self.position(key) {
            self.entries.remove(pos);
            self.entries.push_front((key, value));
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_back()
        } else {
            None
        };
        self.entries.push_front((key, value));
        evicted
    }

    pub fn remove(&mut self, key: u64) -> Option<u64> {
        let pos = self.position(key)?;
        self.entries.remove(pos).map(|(_, v)| v)
    }

    pub fn entries(&self) -> Vec<(u64, u64)> {
        self.entries.iter().copied().collect()
    }
}

/// `RecencyCache<u64, u64>` shadowed by a [`ReferenceLru`].
#[derive(Debug)]
pub struct TrackedCache {
    cache: RecencyCache<u64, u64>,
    model: ReferenceLru,
    mismatches: Vec<String>,
}

impl TrackedCache {
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            cache: RecencyCache::new(capacity)?,
            model: ReferenceLru::new(capacity),
            mismatches: Vec::new(),
        })
    }

    pub fn get(&mut self, key: u64) -> Option<u64> {
        let actual = self.cache.get(&key);
        let expected = self.model.get(key);
        self.compare("get", key, actual, expected);
        actual
    }

    pub fn set(&mut self, key: u64, value: u64) -> Option<(u64, u64)> {
        let actual = self.cache.set(key, value);
        let expected = self.model.set(key, value);
        self.compare("set", key, actual, expected);
        actual
    }

    pub fn remove(&mut self, key: u64) -> Option<u64> {
        let actual = self.cache.remove(&key).ok();
        let expected = self.model.remove(key);
        self.compare("remove", key, actual, expected);
        actual
    }

    /// Operations whose return value differed from the reference LRU.
    pub fn mismatches(&self) -> &[String] {
        &self.mismatches
    }

    fn compare<R: PartialEq + std::fmt::Debug>(
        &mut self,
        op: &str,
        key: u64,
        actual: R,
        expected: R,
    ) {
        if actual != expected {
            self.mismatches.push(format!(
                "{}({}) returned {:?} but reference returned {:?}",
                op, key, actual, expected
            ));
        }
    }
}

impl RecencyCacheProperties for TrackedCache {
    fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    fn map_len(&self) -> usize {
        self.cache.len()
    }

    fn entries_by_recency(&self) -> Vec<(u64, u64)> {
        self.cache.entries_by_recency()
    }

    fn expected_entries_by_recency(&self) -> Vec<(u64, u64)> {
        self.model.entries()
    }
}
