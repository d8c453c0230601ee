//! # lf-stateright
//!
//! Stateright models of the protocols behind the lock-free primitives.
//!
//! Each model breaks an operation into its atomic steps so the checker can
//! explore every interleaving of a few threads. Variants with a known flaw
//! exist alongside the correct protocols so tests can confirm the checker
//! actually finds the counterexample.
//!
//! ## Usage
//!
//! ```ignore
//! use stateright::{Checker, Model};
//! use lf_stateright::{PublishOrder, RingModel};
//!
//! let model = RingModel::new(3, vec![1, 2], 1).with_order(PublishOrder::IndexFirst);
//! let checker = model.checker().spawn_bfs().join();
//! assert!(checker.discovery("consumer reads published payload").is_some());
//! ```
//!
//! ## Modules
//!
//! - `ring_buffer`: slot publish protocol of the bounded ring buffer
//! - `queue`: Michael-Scott linking and tail helping

pub mod queue;
pub mod ring_buffer;

pub use queue::{EnqueuerPc, Node, QueueAction, QueueModel, QueueState};
pub use ring_buffer::{ConsumerPc, ProducerPc, PublishOrder, RingAction, RingModel, RingState};
