//! Multi-threaded conservation and hand-off tests for every structure.

#![cfg(not(loom))]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use lf_structures::{AtomicQueue, AtomicStack, CacheError, RecencyCache, RingBuffer};

const THREADS: u64 = 8;
const PER_THREAD: u64 = 5_000;

/// Value that counts its own drops.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn expected_values() -> Vec<u64> {
    (0..THREADS * PER_THREAD).collect()
}

#[test]
fn test_stack_no_loss_no_duplication() {
    let stack = Arc::new(AtomicStack::new());
    let barrier = Arc::new(Barrier::new(THREADS as usize * 2));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let stack = Arc::clone(&stack);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..PER_THREAD {
                stack.push(t * PER_THREAD + i);
            }
            Vec::new()
        }));
    }
    for _ in 0..THREADS {
        let stack = Arc::clone(&stack);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut got = Vec::new();
            for _ in 0..PER_THREAD {
                if let Some(v) = stack.pop() {
                    got.push(v);
                }
            }
            got
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    while let Some(v) = stack.pop() {
        all.push(v);
    }

    all.sort_unstable();
    assert_eq!(all, expected_values());
    assert!(stack.is_empty());
    assert_eq!(stack.reclaim_stats().retired(), THREADS * PER_THREAD);
}

#[test]
fn test_queue_no_loss_no_duplication() {
    let queue = Arc::new(AtomicQueue::new());
    let barrier = Arc::new(Barrier::new(THREADS as usize * 2));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..PER_THREAD {
                queue.enqueue(t * PER_THREAD + i);
            }
            Vec::new()
        }));
    }
    for _ in 0..THREADS {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut got = Vec::new();
            for _ in 0..PER_THREAD {
                if let Some(v) = queue.dequeue() {
                    got.push(v);
                }
            }
            got
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    while let Some(v) = queue.dequeue() {
        all.push(v);
    }

    all.sort_unstable();
    assert_eq!(all, expected_values());
    assert!(queue.is_empty());
}

#[test]
fn test_ring_buffer_every_pop_matches_a_push() {
    let ring = Arc::new(RingBuffer::new(64).unwrap());
    let consumed_total = Arc::new(AtomicUsize::new(0));
    let total = (THREADS * PER_THREAD) as usize;

    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    // Boxed so a torn or unpublished read would be caught.
                    let mut msg = Box::new((t, i, t * PER_THREAD + i));
                    loop {
                        match ring.try_push(msg) {
                            Ok(()) => break,
                            Err(full) => {
                                msg = full.into_inner();
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..THREADS)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let consumed_total = Arc::clone(&consumed_total);
            thread::spawn(move || {
                let mut got = Vec::new();
                while consumed_total.load(Ordering::SeqCst) < total {
                    match ring.try_pop() {
                        Some(msg) => {
                            consumed_total.fetch_add(1, Ordering::SeqCst);
                            got.push(*msg);
                        }
                        None => thread::yield_now(),
                    }
                }
                got
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }

    let mut per_producer: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut all = Vec::new();
    for h in consumers {
        let got = h.join().unwrap();
        for (t, i, v) in got.iter().copied() {
            assert_eq!(v, t * PER_THREAD + i, "Payload does not match its push");
        }
        for (t, i, _) in &got {
            per_producer.entry(*t).or_default().push(*i);
        }
        all.extend(got.into_iter().map(|(_, _, v)| v));
    }

    all.sort_unstable();
    assert_eq!(all, expected_values());
    assert_eq!(per_producer.len(), THREADS as usize);
    assert!(ring.is_empty());
}

#[test]
fn test_ring_buffer_capacity_example() {
    let ring = RingBuffer::new(8).unwrap();

    let accepted = (0..8).filter(|i| ring.try_push(*i).is_ok()).count();
    assert_eq!(accepted, 7);
    assert!(ring.try_push(100).is_err());

    assert_eq!(ring.try_pop(), Some(0));
    assert!(ring.try_push(101).is_ok());
    assert!(ring.try_push(102).is_err());
}

#[test]
fn test_resident_values_dropped_with_structure() {
    let drops = Arc::new(AtomicUsize::new(0));

    {
        let stack = AtomicStack::new();
        let queue = AtomicQueue::new();
        let ring = RingBuffer::new(8).unwrap();
        for _ in 0..5 {
            stack.push(DropCounter(Arc::clone(&drops)));
            queue.enqueue(DropCounter(Arc::clone(&drops)));
            assert!(ring.try_push(DropCounter(Arc::clone(&drops))).is_ok());
        }

        drop(stack.pop());
        drop(queue.dequeue());
        drop(ring.try_pop());
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    assert_eq!(drops.load(Ordering::SeqCst), 15);
}

#[test]
fn test_recency_cache_examples() {
    let cache = RecencyCache::new(2).unwrap();
    cache.set("a", 1);
    cache.set("b", 2);
    cache.get(&"a");
    cache.set("c", 3);

    let mut resident = cache.entries_by_recency();
    resident.sort_unstable();
    assert_eq!(resident, vec![("a", 1), ("c", 3)]);

    let single = RecencyCache::new(1).unwrap();
    single.set("k", 1);
    single.set("k", 2);
    assert_eq!(single.entries_by_recency(), vec![("k", 2)]);

    assert_eq!(cache.remove(&"zzz"), Err(CacheError::NotFound));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.remove(&"a"), Ok(1));
    assert_eq!(cache.get(&"a"), None);
}

#[test]
fn test_recency_cache_contended() {
    let cache = Arc::new(RecencyCache::new(32).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let key = (t + i) % 64;
                    cache.set(key, key + 1000);
                    if let Some(v) = cache.get(&((key + 1) % 64)) {
                        assert_eq!(v, (key + 1) % 64 + 1000);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(cache.len(), 32);
    assert_eq!(cache.keys_by_recency().len(), 32);
}
