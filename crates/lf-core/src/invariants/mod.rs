//! Invariant traits and checkers, one module per structure.
//!
//! ## Lock-free structures
//! - `stack`: Treiber stack (NoLostElements, NoDuplicates, LifoOrder)
//! - `queue`: Michael–Scott queue (NoLostElements, NoDuplicates, FifoOrder, ResidentOrder)
//! - `ring_buffer`: bounded ring (NoLostMessages, FifoOrder, BoundedCapacity, FullOnlyAtCapacity)
//! - `reclaim`: deferred reclamation (RetiredMatchesDetached, ReclaimedNotAboveRetired)
//!
//! ## Lock-based structures
//! - `recency_cache`: LRU (MapListAgreement, BoundedCapacity, RecencyOrder, ValueAgreement)

mod container;
pub mod history;
pub mod queue;
pub mod recency_cache;
pub mod reclaim;
pub mod ring_buffer;
pub mod stack;

pub use history::{Discipline, History, OpKind, Operation, ReplayMismatch};
pub use queue::{QueueProperties, QueuePropertyChecker};
pub use recency_cache::{RecencyCacheProperties, RecencyCachePropertyChecker};
pub use reclaim::{ReclaimProperties, ReclaimPropertyChecker};
pub use ring_buffer::{RingBufferProperties, RingBufferPropertyChecker};
pub use stack::{StackProperties, StackPropertyChecker};
