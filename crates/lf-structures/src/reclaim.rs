//! Deferred reclamation for nodes unlinked from the lock-free structures.
//!
//! A thread that dereferences a shared node pointer does so inside a
//! [`CriticalSection`]. A node unlinked by a winning CAS is handed to
//! [`CriticalSection::retire`], which defers the free until every thread
//! that was inside a critical section at that moment has left it.
//!
//! # Memory Safety
//!
//! Uses epoch-based reclamation from crossbeam-epoch. Two hazards are closed
//! by the same mechanism:
//!
//! - use-after-free: a node loaded while pinned stays allocated until the
//!   loading thread unpins.
//! - ABA: an address cannot be handed out again by the allocator while a
//!   thread that loaded it is still pinned, so a CAS that compares pointer
//!   identity cannot succeed against a recycled node.
//!
//! Under `--cfg loom` the substrate leaks retired nodes instead. Loom models
//! are bounded, and crossbeam-epoch's internal atomics are invisible to loom.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(not(loom))]
use crossbeam_epoch::{self as epoch, Guard};

/// Retire/reclaim counters for one structure.
#[derive(Debug, Default)]
pub struct ReclaimStats {
    retired: AtomicU64,
    reclaimed: AtomicU64,
}

impl ReclaimStats {
    /// Nodes handed to `retire`.
    pub fn retired(&self) -> u64 {
        self.retired.load(Ordering::Relaxed)
    }

    /// Nodes physically freed. Never exceeds `retired()`.
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Nodes retired but not yet freed.
    pub fn pending(&self) -> u64 {
        self.retired().saturating_sub(self.reclaimed())
    }
}

/// Reclamation domain owned by a stack or queue.
///
/// All instances share crossbeam's global collector; the domain only owns
/// the counters.
#[derive(Debug, Default)]
pub struct Reclaimer {
    stats: Arc<ReclaimStats>,
}

impl Reclaimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the calling thread until the returned section is exited.
    #[must_use]
    pub fn enter_critical_section(&self) -> CriticalSection<'_> {
        CriticalSection {
            #[cfg(not(loom))]
            guard: epoch::pin(),
            stats: &self.stats,
        }
    }

    pub fn stats(&self) -> &ReclaimStats {
        &self.stats
    }

    /// Push this thread's deferred frees to the global queue.
    pub fn flush(&self) {
        self.enter_critical_section().flush();
    }
}

/// Region in which shared node pointers may be dereferenced.
///
/// Exits on drop.
pub struct CriticalSection<'r> {
    #[cfg(not(loom))]
    guard: Guard,
    stats: &'r Arc<ReclaimStats>,
}

impl CriticalSection<'_> {
    /// Defer freeing `node` until no thread can still be reading it.
    ///
    /// # Safety
    ///
    /// - `node` must come from `Box::into_raw` and be unreachable from the
    ///   shared structure (the caller won the CAS that unlinked it).
    /// - `node` must be retired at most once.
    /// - Dropping the box must not drop any value the caller moved out.
    pub unsafe fn retire<N>(&self, node: *mut N) {
        debug_assert!(!node.is_null(), "Retired a null node");
        self.stats.retired.fetch_add(1, Ordering::Relaxed);

        #[cfg(not(loom))]
        {
            let stats = Arc::clone(self.stats);
            self.guard.defer_unchecked(move || {
                drop(Box::from_raw(node));
                stats.reclaimed.fetch_add(1, Ordering::Relaxed);
            });
        }

        #[cfg(loom)]
        let _ = node;
    }

    /// Move deferred frees to the global queue so they can run sooner.
    pub fn flush(&self) {
        #[cfg(not(loom))]
        self.guard.flush();
    }

    /// Leave the critical section.
    pub fn exit(self) {
        drop(self);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_retire_counts_and_eventually_reclaims() {
        let reclaimer = Reclaimer::new();

        for i in 0..64u64 {
            let cs = reclaimer.enter_critical_section();
            let node = Box::into_raw(Box::new(i));
            unsafe { cs.retire(node) };
            cs.exit();
        }
        assert_eq!(reclaimer.stats().retired(), 64);
        assert!(reclaimer.stats().reclaimed() <= 64);

        // Each pin may advance the epoch and collect a batch.
        for _ in 0..10_000 {
            if reclaimer.stats().reclaimed() == 64 {
                break;
            }
            reclaimer.flush();
        }
        assert!(reclaimer.stats().reclaimed() <= reclaimer.stats().retired());
    }

    #[test]
    fn test_node_survives_while_section_is_open() {
        use std::sync::atomic::AtomicBool;

        struct Flagged(Arc<AtomicBool>);
        impl Drop for Flagged {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let reclaimer = Reclaimer::new();
        let freed = Arc::new(AtomicBool::new(false));

        let reader = reclaimer.enter_critical_section();
        {
            let cs = reclaimer.enter_critical_section();
            let node = Box::into_raw(Box::new(Flagged(Arc::clone(&freed))));
            unsafe { cs.retire(node) };
            cs.flush();
        }

        // The reader pinned before the retire, so the node must still exist.
        for _ in 0..100 {
            epoch::pin().flush();
        }
        assert!(!freed.load(Ordering::SeqCst));
        reader.exit();
    }
}
