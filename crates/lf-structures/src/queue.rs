//! Michael-Scott queue - lock-free FIFO queue.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, loom |
//! | NoDuplicates | DST, loom |
//! | FifoOrder | DST, Kani |
//! | TailNeverAhead | stateright |
//!
//! # Protocol
//!
//! `head` always points at a sentinel whose value is not part of the queue.
//! The queue is empty when `head == tail` and the sentinel has no successor.
//! `tail` may lag the last node by one link. Any thread that observes the
//! lag swings `tail` forward before continuing, so a stalled enqueuer can
//! never block the others.
//!
//! A successful dequeue makes the old sentinel's successor the new sentinel.
//! Only the thread that won the head CAS moves the value out of it.

use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;

use crossbeam_utils::CachePadded;

use crate::reclaim::{ReclaimStats, Reclaimer};
use crate::sync::{backoff, AtomicPtr, AtomicUsize, Ordering};

/// A lock-free Michael-Scott FIFO queue.
pub struct AtomicQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    len: AtomicUsize,
    reclaimer: Reclaimer,
    _owns: PhantomData<T>,
}

struct Node<T> {
    /// Uninit for the initial sentinel. Moved out when the node becomes
    /// the sentinel.
    value: MaybeUninit<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn boxed(value: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

impl<T> AtomicQueue<T> {
    /// Create a queue holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        let sentinel = Node::boxed(MaybeUninit::uninit());
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            len: AtomicUsize::new(0),
            reclaimer: Reclaimer::new(),
            _owns: PhantomData,
        }
    }

    /// Append a value at the tail. Always succeeds.
    pub fn enqueue(&self, value: T) {
        let node = Node::boxed(MaybeUninit::new(value));
        self.len.fetch_add(1, Ordering::Relaxed);

        let _cs = self.reclaimer.enter_critical_section();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // Safety: tail is never retired while reachable, and we are pinned.
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if tail != self.tail.load(Ordering::Acquire) {
                backoff();
                continue;
            }

            if next.is_null() {
                let linked = unsafe {
                    (*tail).next.compare_exchange(
                        ptr::null_mut(),
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    )
                };
                if linked.is_ok() {
                    // Best effort: a failure means someone already helped.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return;
                }
            } else {
                // Tail is lagging. Help the stalled enqueuer.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
            }

            backoff();
        }
    }

    /// Remove the oldest value, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let cs = self.reclaimer.enter_critical_section();
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            // Safety: head was loaded while pinned.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };

            if head != self.head.load(Ordering::Acquire) {
                backoff();
                continue;
            }

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // An enqueue linked a node but has not swung tail yet.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
            } else if !next.is_null()
                && self
                    .head
                    .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                // Safety: `next` is now the sentinel and this thread won the
                // CAS that made it so; no other thread reads its value.
                let value = unsafe { (*next).value.assume_init_read() };
                // Safety: the old sentinel is unreachable from head, and tail
                // was observed past it.
                unsafe { cs.retire(head) };
                return Some(value);
            }

            backoff();
        }
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let _cs = self.reclaimer.enter_critical_section();
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    /// Number of resident values. Approximate while operations are in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Retire/reclaim counters of this queue's nodes.
    pub fn reclaim_stats(&self) -> &ReclaimStats {
        self.reclaimer.stats()
    }

    /// Push deferred node frees from this thread to the global collector.
    pub fn flush_reclamation(&self) {
        self.reclaimer.flush();
    }
}

impl<T: Copy> AtomicQueue<T> {
    /// Copy of the contents, head to tail.
    ///
    /// Exact when no other thread is operating on the queue; otherwise a
    /// best-effort view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let _cs = self.reclaimer.enter_critical_section();
        let mut out = Vec::with_capacity(self.len());
        let head = self.head.load(Ordering::Acquire);
        let mut current = unsafe { (*head).next.load(Ordering::Acquire) };

        while !current.is_null() {
            // Safety: pinned; every node past the sentinel holds an
            // initialized value written before it was linked.
            unsafe {
                out.push((*current).value.assume_init());
                current = (*current).next.load(Ordering::Acquire);
            }
        }

        out
    }
}

impl<T> Default for AtomicQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AtomicQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for AtomicQueue<T> {
    fn drop(&mut self) {
        let mut current = self.head.load(Ordering::Relaxed);
        let mut sentinel = true;

        while !current.is_null() {
            let mut node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
            if !sentinel {
                unsafe { node.value.assume_init_drop() };
            }
            sentinel = false;
        }
    }
}

// Safety: values move between threads through the queue, nodes are only
// freed through the reclamation substrate.
unsafe impl<T: Send> Send for AtomicQueue<T> {}
unsafe impl<T: Send> Sync for AtomicQueue<T> {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_enqueue_dequeue() {
        let queue = AtomicQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);

        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.snapshot(), vec![1, 2, 3]);

        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_interleaved_fifo() {
        let queue = AtomicQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.dequeue(), Some(1));
        queue.enqueue(3);
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
        queue.enqueue(4);
        assert_eq!(queue.dequeue(), Some(4));
    }

    #[test]
    fn test_each_dequeue_retires_old_sentinel() {
        let queue = AtomicQueue::new();
        for i in 0..10 {
            queue.enqueue(i);
        }
        for _ in 0..10 {
            queue.dequeue();
        }
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.reclaim_stats().retired(), 10);
    }

    #[test]
    fn test_owned_values_never_duplicated() {
        let tracker = Arc::new(());
        {
            let queue = AtomicQueue::new();
            for _ in 0..6 {
                queue.enqueue(Arc::clone(&tracker));
            }
            let first = queue.dequeue();
            assert!(first.is_some());
            assert_eq!(Arc::strong_count(&tracker), 7);
            drop(first);
            assert_eq!(Arc::strong_count(&tracker), 6);
        }
        // Resident values dropped with the queue, the sentinel's moved-out
        // value is not dropped twice.
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_concurrent_mpmc_conserves_values() {
        let queue = Arc::new(AtomicQueue::new());
        let producers = 4u64;
        let per_producer = 1_000u64;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.enqueue(p * per_producer + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..producers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    for _ in 0..per_producer {
                        if let Some(v) = queue.dequeue() {
                            got.push(v);
                        }
                    }
                    got
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let mut per_consumer: Vec<Vec<u64>> =
            consumers.into_iter().map(|h| h.join().unwrap()).collect();

        // Per producer, any single consumer sees values in enqueue order.
        for got in &per_consumer {
            for p in 0..producers {
                let mine: Vec<u64> = got
                    .iter()
                    .copied()
                    .filter(|v| v / per_producer == p)
                    .collect();
                assert!(mine.windows(2).all(|w| w[0] < w[1]), "FIFO violated");
            }
        }

        let mut rest = Vec::new();
        while let Some(v) = queue.dequeue() {
            rest.push(v);
        }
        per_consumer.push(rest);

        let mut all: Vec<u64> = per_consumer.into_iter().flatten().collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..producers * per_producer).collect();
        assert_eq!(all, expected, "Lost or duplicated elements");
    }
}
