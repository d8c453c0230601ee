//! # lf-structures
//!
//! Concurrent primitives for hand-off between threads without a global lock.
//!
//! # Lock-Free Modules
//!
//! - `stack`: Treiber stack on a single atomic top pointer
//! - `queue`: Michael-Scott queue with a sentinel and tail helping
//! - `ring_buffer`: bounded MPMC ring buffer, `N` slots with `N - 1` usable
//! - `reclaim`: epoch-based deferred reclamation shared by stack and queue
//!
//! # Lock-Based Modules
//!
//! - `recency_cache`: capacity-bounded LRU cache under one mutex
//!
//! # Verification
//!
//! - loom tests for thread interleavings (under `#[cfg(loom)]`)
//! - Kani proofs for bounded sequential properties (under `#[cfg(kani)]`)
//! - invariants checked by the `lf-dst` simulation and `lf-stateright` models

pub mod error;
mod kani_proofs;
pub mod queue;
pub mod recency_cache;
pub mod reclaim;
pub mod ring_buffer;
pub mod stack;
mod sync;

pub use error::{CacheError, CapacityError, Full};
pub use queue::AtomicQueue;
pub use recency_cache::RecencyCache;
pub use reclaim::{CriticalSection, ReclaimStats, Reclaimer};
pub use ring_buffer::RingBuffer;
pub use stack::AtomicStack;
