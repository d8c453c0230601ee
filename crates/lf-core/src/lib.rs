//! # lf-core
//!
//! Property checking for the lock-free primitives.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - One properties trait and checker per structure (e.g. `StackProperties`)
//!
//! The checkers know nothing about how a structure is implemented. A test
//! harness exposes the structure's observable state (what went in, what came
//! out, what is still resident) through the traits and the checker decides
//! whether the invariants hold.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, ThreadAction};
pub use property::{PropertyChecker, PropertyResult};
