//! Bounded lock-free ring buffer.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostMessages | DST, loom |
//! | FifoOrder | DST, Kani |
//! | BoundedCapacity (N-1) | DST, Kani |
//! | PublishedBeforeRead | loom, stateright |
//!
//! # Protocol
//!
//! `head` and `tail` are stamps: the low bits hold a slot index in `[0, N)`,
//! the high bits count laps. Every slot carries a stamp too:
//!
//! - `stamp == tail`: vacant, writable by the producer that claims `tail`.
//! - `stamp == head + 1`: published, readable by the consumer that claims
//!   `head`.
//!
//! A producer claims a position by CAS on `tail`, writes the payload, then
//! release-stores the slot stamp. A consumer claims by CAS on `head` only
//! after acquiring a published stamp, moves the payload out, then
//! release-stores the stamp of the same slot one lap later. A slot whose
//! position is claimed but whose stamp is not yet stored is never read: the
//! other side spins on it.
//!
//! One slot always stays vacant, so usable capacity is `N - 1`.

use std::fmt;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;
use tracing::debug;

use crate::error::{CapacityError, Full};
use crate::sync::{backoff, AtomicUsize, Ordering, UnsafeCell};

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded multi-producer multi-consumer ring buffer with `N` slots.
pub struct RingBuffer<T> {
    /// Consumer position.
    head: CachePadded<AtomicUsize>,
    /// Producer position.
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    /// Stamp increment for one full lap. A power of two above `N`.
    one_lap: usize,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer with `slots` slots, `slots - 1` of them usable.
    pub fn new(slots: usize) -> Result<Self, CapacityError> {
        if slots == 0 {
            return Err(CapacityError::Zero);
        }

        let one_lap = slots
            .checked_add(1)
            .and_then(usize::checked_next_power_of_two)
            .ok_or(CapacityError::TooLarge(slots))?;
        let buffer = (0..slots)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        debug!(slots, capacity = slots - 1, "ring buffer created");

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer,
            one_lap,
        })
    }

    /// Try to append a value. Hands the value back if the buffer is full.
    pub fn try_push(&self, value: T) -> Result<(), Full<T>> {
        let capacity = self.capacity();
        let mut tail = self.tail.load(Ordering::SeqCst);

        loop {
            let head = self.head.load(Ordering::SeqCst);

            if self.distance(head, tail) >= capacity {
                // Full only if tail did not move while head was read.
                let current = self.tail.load(Ordering::SeqCst);
                if current == tail {
                    return Err(Full(value));
                }
                tail = current;
                continue;
            }

            let slot = &self.buffer[self.index(tail)];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == tail {
                match self.tail.compare_exchange_weak(
                    tail,
                    self.advance(tail),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        // Safety: the CAS gave this thread exclusive write
                        // access to the vacant slot until the stamp store.
                        slot.value
                            .with_mut(|p| unsafe { p.write(MaybeUninit::new(value)) });
                        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        tail = current;
                        backoff();
                    }
                }
            } else {
                // A consumer still owns the previous lap's value, or tail
                // is stale.
                backoff();
                tail = self.tail.load(Ordering::SeqCst);
            }
        }
    }

    /// Try to remove the oldest value. `None` if the buffer is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::SeqCst);

        loop {
            let slot = &self.buffer[self.index(head)];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == head.wrapping_add(1) {
                match self.head.compare_exchange_weak(
                    head,
                    self.advance(head),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        // Safety: the stamp acquire saw the producer's
                        // publication, and the CAS made this thread the
                        // slot's only reader.
                        let value = slot.value.with_mut(|p| unsafe { (*p).assume_init_read() });
                        slot.stamp
                            .store(head.wrapping_add(self.one_lap), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => {
                        head = current;
                        backoff();
                    }
                }
            } else if stamp == head {
                // Unpublished: empty, or a producer is mid-write.
                if self.tail.load(Ordering::SeqCst) == head {
                    return None;
                }
                backoff();
                head = self.head.load(Ordering::SeqCst);
            } else {
                backoff();
                head = self.head.load(Ordering::SeqCst);
            }
        }
    }

    /// Usable capacity, one less than the slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Number of slots `N`.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.buffer.len()
    }

    /// Number of claimed positions not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);
            if self.tail.load(Ordering::SeqCst) == tail {
                return self.distance(head, tail);
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Producer index in `[0, N)`.
    #[must_use]
    pub fn producer_index(&self) -> usize {
        self.index(self.tail.load(Ordering::SeqCst))
    }

    /// Consumer index in `[0, N)`.
    #[must_use]
    pub fn consumer_index(&self) -> usize {
        self.index(self.head.load(Ordering::SeqCst))
    }

    #[inline]
    fn index(&self, stamp: usize) -> usize {
        stamp & (self.one_lap - 1)
    }

    #[inline]
    fn advance(&self, stamp: usize) -> usize {
        if self.index(stamp) + 1 < self.buffer.len() {
            stamp + 1
        } else {
            (stamp & !(self.one_lap - 1)).wrapping_add(self.one_lap)
        }
    }

    /// Positions from `head` up to `tail`.
    fn distance(&self, head: usize, tail: usize) -> usize {
        let hix = self.index(head);
        let tix = self.index(tail);

        if hix < tix {
            tix - hix
        } else if hix > tix {
            self.buffer.len() - hix + tix
        } else if head == tail {
            0
        } else {
            self.buffer.len()
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Clone of the contents, oldest first. Needs exclusive access.
    #[must_use]
    pub fn snapshot(&mut self) -> Vec<T> {
        let hix = self.index(self.head.load(Ordering::Relaxed));
        let len = self.len();

        (0..len)
            .map(|i| {
                let slot = &self.buffer[(hix + i) % self.buffer.len()];
                // Safety: exclusive access, and every position in
                // `head..tail` holds a published value.
                slot.value
                    .with_mut(|p| unsafe { (*p).assume_init_ref().clone() })
            })
            .collect()
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("slots", &self.slots())
            .field("len", &self.len())
            .field("producer_index", &self.producer_index())
            .field("consumer_index", &self.consumer_index())
            .finish()
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        let hix = self.index(self.head.load(Ordering::Relaxed));
        let len = self.len();

        for i in 0..len {
            let slot = &self.buffer[(hix + i) % self.buffer.len()];
            slot.value.with_mut(|p| unsafe { (*p).assume_init_drop() });
        }
    }
}

// Safety: a slot's value is accessed only by the thread that claimed its
// position, and hand-off is ordered by the slot stamp.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_slots_rejected() {
        assert_eq!(RingBuffer::<u64>::new(0).unwrap_err(), CapacityError::Zero);
    }

    #[test]
    fn test_oversized_slot_count_rejected_before_allocating() {
        for slots in [usize::MAX, usize::MAX / 2 + 1] {
            assert_eq!(
                RingBuffer::<u64>::new(slots).unwrap_err(),
                CapacityError::TooLarge(slots)
            );
        }
    }

    #[test]
    fn test_usable_capacity_is_one_less_than_slots() {
        let ring = RingBuffer::new(4).unwrap();
        assert_eq!(ring.slots(), 4);
        assert_eq!(ring.capacity(), 3);

        for i in 0..3 {
            assert!(ring.try_push(i).is_ok(), "push {} should succeed", i);
        }
        assert!(ring.is_full());
        assert_eq!(ring.try_push(99).unwrap_err().into_inner(), 99);
        assert_eq!(ring.len(), 3);

        assert_eq!(ring.try_pop(), Some(0));
        assert!(ring.try_push(3).is_ok());
        assert!(ring.try_push(4).is_err());
    }

    #[test]
    fn test_single_slot_is_always_full() {
        let ring = RingBuffer::new(1).unwrap();
        assert_eq!(ring.capacity(), 0);
        assert!(ring.is_empty());
        assert!(ring.is_full());
        assert!(ring.try_push(1).is_err());
        assert_eq!(ring.try_pop(), None);
    }

    #[test]
    fn test_fifo_across_many_laps() {
        let ring = RingBuffer::new(3).unwrap();
        let mut next_pop = 0u64;

        for i in 0..1_000u64 {
            if ring.try_push(i).is_err() {
                assert_eq!(ring.try_pop(), Some(next_pop));
                next_pop += 1;
                ring.try_push(i).unwrap();
            }
            assert!(ring.producer_index() < 3);
            assert!(ring.consumer_index() < 3);
        }

        while let Some(v) = ring.try_pop() {
            assert_eq!(v, next_pop);
            next_pop += 1;
        }
        assert_eq!(next_pop, 1_000);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_indices_report_position_mod_slots() {
        let ring = RingBuffer::new(3).unwrap();
        ring.try_push('a').unwrap();
        ring.try_push('b').unwrap();
        assert_eq!(ring.producer_index(), 2);
        assert_eq!(ring.try_pop(), Some('a'));
        ring.try_push('c').unwrap();
        assert_eq!(ring.producer_index(), 0);
        assert_eq!(ring.consumer_index(), 1);
    }

    #[test]
    fn test_snapshot_oldest_first() {
        let mut ring = RingBuffer::new(4).unwrap();
        ring.try_push(1).unwrap();
        ring.try_push(2).unwrap();
        ring.try_pop();
        ring.try_push(3).unwrap();
        ring.try_push(4).unwrap();
        assert_eq!(ring.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn test_unconsumed_values_dropped() {
        let tracker = Arc::new(());
        {
            let ring = RingBuffer::new(8).unwrap();
            for _ in 0..5 {
                ring.try_push(Arc::clone(&tracker)).unwrap();
            }
            drop(ring.try_pop());
            assert_eq!(Arc::strong_count(&tracker), 5);
        }
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_concurrent_heap_values_visible_and_unique() {
        let ring = Arc::new(RingBuffer::new(16).unwrap());
        let producers = 4usize;
        let per_producer = 2_000usize;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        let mut msg = format!("{}-{}", p, i);
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

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    let mut idle = 0;
                    while idle < 100_000 {
                        match ring.try_pop() {
                            Some(msg) => {
                                got.push(msg);
                                idle = 0;
                            }
                            None => {
                                idle += 1;
                                thread::yield_now();
                            }
                        }
                    }
                    got
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let mut seen = HashSet::new();
        for h in consumers {
            for msg in h.join().unwrap() {
                assert!(seen.insert(msg), "Duplicate message");
            }
        }
        while let Some(msg) = ring.try_pop() {
            assert!(seen.insert(msg), "Duplicate message");
        }

        assert_eq!(seen.len(), producers * per_producer, "Lost messages");
        for p in 0..producers {
            for i in 0..per_producer {
                assert!(seen.contains(&format!("{}-{}", p, i)));
            }
        }
    }
}

/// Loom tests - exhaustively check claim/publish interleavings.
#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn test_consumer_sees_published_payload() {
        loom::model(|| {
            let ring = Arc::new(RingBuffer::new(2).unwrap());
            let producer = Arc::clone(&ring);

            let h = thread::spawn(move || {
                producer.try_push(String::from("payload")).unwrap();
            });

            let popped = ring.try_pop();
            h.join().unwrap();

            match popped {
                Some(msg) => assert_eq!(msg, "payload"),
                None => assert_eq!(ring.try_pop().as_deref(), Some("payload")),
            }
        });
    }

    #[test]
    fn test_racing_producers_respect_capacity() {
        loom::model(|| {
            let ring = Arc::new(RingBuffer::new(2).unwrap());
            let r1 = Arc::clone(&ring);
            let r2 = Arc::clone(&ring);

            let h1 = thread::spawn(move || r1.try_push(1).is_ok());
            let h2 = thread::spawn(move || r2.try_push(2).is_ok());
            let ok1 = h1.join().unwrap();
            let ok2 = h2.join().unwrap();

            assert!(ok1 ^ ok2, "Exactly one push fits in one usable slot");
            assert!(ring.try_pop().is_some());
            assert!(ring.try_pop().is_none());
        });
    }

    #[test]
    fn test_slot_reuse_after_wrap() {
        loom::model(|| {
            let ring = Arc::new(RingBuffer::new(2).unwrap());
            ring.try_push(1).unwrap();

            let consumer = Arc::clone(&ring);
            let h = thread::spawn(move || consumer.try_pop());

            // Succeeds only once the consumer has vacated a slot.
            let pushed = ring.try_push(2).is_ok();
            assert_eq!(h.join().unwrap(), Some(1));

            let rest: Vec<_> = std::iter::from_fn(|| ring.try_pop()).collect();
            if pushed {
                assert_eq!(rest, vec![2]);
            } else {
                assert!(rest.is_empty());
            }
        });
    }
}
