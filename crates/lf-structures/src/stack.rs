//! Treiber stack - lock-free LIFO stack.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, loom |
//! | NoDuplicates | DST, loom |
//! | LifoOrder | DST, Kani |
//! | ABA safety | epoch reclamation |
//!
//! # Memory Safety
//!
//! `pop` dereferences the observed top node, so it runs inside a
//! reclamation critical section and retires the node it unlinks. `push`
//! never dereferences a shared node and needs no critical section: if its
//! CAS succeeds, the new node links to whatever node is top at that instant.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;

use crossbeam_utils::CachePadded;

use crate::reclaim::{ReclaimStats, Reclaimer};
use crate::sync::{backoff, AtomicPtr, AtomicUsize, Ordering};

/// A lock-free Treiber stack.
///
/// The classic design by R. Kent Treiber (1986): a single atomic top
/// pointer updated by CAS. Operations are linearizable and lock-free.
pub struct AtomicStack<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    len: AtomicUsize,
    reclaimer: Reclaimer,
    _owns: PhantomData<T>,
}

struct Node<T> {
    /// Moved out by the popping thread; never dropped with the node.
    value: ManuallyDrop<T>,
    /// Written before the node is published, immutable afterwards.
    next: *mut Node<T>,
}

impl<T> AtomicStack<T> {
    /// Create a new empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            len: AtomicUsize::new(0),
            reclaimer: Reclaimer::new(),
            _owns: PhantomData,
        }
    }

    /// Push a value onto the stack. Always succeeds.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value: ManuallyDrop::new(value),
            next: ptr::null_mut(),
        }));

        // Counted before publication so a racing pop can never underflow.
        self.len.fetch_add(1, Ordering::Relaxed);

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // Safety: node is not yet shared.
            unsafe {
                (*node).next = head;
            }

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    backoff();
                }
            }
        }
    }

    /// Pop the most recently pushed value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let cs = self.reclaimer.enter_critical_section();
        let mut head = self.head.load(Ordering::Acquire);

        loop {
            if head.is_null() {
                return None;
            }

            // Safety: head was loaded inside `cs`, so it has not been freed
            // even if another thread already unlinked it.
            let next = unsafe { (*head).next };

            match self
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    // Safety: the CAS made this thread the node's only owner.
                    // The value is read exactly once and the node is retired
                    // without dropping it.
                    let value = unsafe { ManuallyDrop::into_inner(ptr::read(&(*head).value)) };
                    unsafe { cs.retire(head) };
                    return Some(value);
                }
                Err(current) => {
                    head = current;
                    backoff();
                }
            }
        }
    }

    /// Check if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Number of resident values. Approximate while operations are in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Retire/reclaim counters of this stack's nodes.
    pub fn reclaim_stats(&self) -> &ReclaimStats {
        self.reclaimer.stats()
    }

    /// Push deferred node frees from this thread to the global collector.
    pub fn flush_reclamation(&self) {
        self.reclaimer.flush();
    }
}

impl<T: Copy> AtomicStack<T> {
    /// Copy of the contents, top to bottom.
    ///
    /// Exact when no other thread is operating on the stack; otherwise a
    /// best-effort view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let _cs = self.reclaimer.enter_critical_section();
        let mut out = Vec::with_capacity(self.len());
        let mut current = self.head.load(Ordering::Acquire);

        while !current.is_null() {
            // Safety: pinned by `_cs`; the value bytes are immutable after
            // publication and `T: Copy` has no ownership to duplicate.
            unsafe {
                out.push(*(*current).value);
                current = (*current).next;
            }
        }

        out
    }
}

impl<T> Default for AtomicStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AtomicStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicStack")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for AtomicStack<T> {
    fn drop(&mut self) {
        // Exclusive access: no other thread can hold a node.
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let mut node = unsafe { Box::from_raw(current) };
            current = node.next;
            unsafe { ManuallyDrop::drop(&mut node.value) };
        }
    }
}

// Safety: values move between threads through the stack, nodes are only
// freed through the reclamation substrate.
unsafe impl<T: Send> Send for AtomicStack<T> {}
unsafe impl<T: Send> Sync for AtomicStack<T> {}
