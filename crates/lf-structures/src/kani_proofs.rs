//! Kani proof harnesses for sequential behavior.
//!
//! # Running the proofs
//!
//! ```bash
//! cargo kani -p lf-structures
//! cargo kani -p lf-structures --harness proof_ring_usable_capacity
//! ```
//!
//! Kani doesn't execute threads. Interleavings are covered by the loom tests
//! and the stateright models.

#[cfg(kani)]
mod proofs {
    use crate::queue::AtomicQueue;
    use crate::recency_cache::RecencyCache;
    use crate::ring_buffer::RingBuffer;
    use crate::stack::AtomicStack;

    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_stack_lifo_order() {
        let stack = AtomicStack::new();

        let v1: u64 = kani::any();
        let v2: u64 = kani::any();
        kani::assume(v1 != v2);

        stack.push(v1);
        stack.push(v2);

        kani::assert(stack.pop() == Some(v2), "Last pushed value pops first");
        kani::assert(stack.pop() == Some(v1), "First pushed value pops last");
        kani::assert(stack.pop().is_none(), "Drained stack is empty");
    }

    /// Whatever the push/pop sequence, pops never exceed pushes.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_stack_pop_count_bounded() {
        let stack = AtomicStack::new();
        let mut pushed: u64 = 0;
        let mut popped: u64 = 0;

        for _ in 0..4u8 {
            if kani::any() {
                stack.push(pushed);
                pushed += 1;
            } else if stack.pop().is_some() {
                popped += 1;
            }
        }

        kani::assert(popped <= pushed, "Cannot pop more elements than pushed");
        kani::assert(stack.len() as u64 == pushed - popped, "len tracks residents");
    }

    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_queue_fifo_order() {
        let queue = AtomicQueue::new();

        let v1: u64 = kani::any();
        let v2: u64 = kani::any();

        queue.enqueue(v1);
        queue.enqueue(v2);

        kani::assert(queue.dequeue() == Some(v1), "First enqueued dequeues first");
        kani::assert(queue.dequeue() == Some(v2), "Second enqueued dequeues second");
        kani::assert(queue.dequeue().is_none(), "Drained queue is empty");
    }

    /// From empty, exactly N-1 pushes fit.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_ring_usable_capacity() {
        let slots: usize = kani::any();
        kani::assume(slots >= 1 && slots <= 4);

        let ring = RingBuffer::new(slots).unwrap();
        for i in 0..slots - 1 {
            kani::assert(ring.try_push(i).is_ok(), "Push below capacity succeeds");
        }
        kani::assert(ring.try_push(99).is_err(), "Push at capacity fails");

        if slots > 1 {
            kani::assert(ring.try_pop() == Some(0), "Oldest value pops first");
            kani::assert(ring.try_push(100).is_ok(), "One pop frees one slot");
        }
    }

    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_cache_single_slot_update_keeps_one_entry() {
        let cache = RecencyCache::new(1).unwrap();
        let a: u64 = kani::any();
        let b: u64 = kani::any();

        cache.set(7u64, a);
        kani::assert(cache.set(7u64, b).is_none(), "Update never evicts");
        kani::assert(cache.len() == 1, "Exactly one entry");
        kani::assert(cache.get(&7) == Some(b), "Update replaces the value");
    }
}
