//! # lf-dst
//!
//! Deterministic Simulation Testing for the lock-free primitives.
//!
//! Inspired by FoundationDB and TigerBeetle, this crate provides deterministic
//! simulation of time, randomness, scheduling and faults. All behavior is
//! reproducible via a seed.
//!
//! ## Runners
//!
//! - `runner`: one workload per structure (stack, queue, ring buffer, LRU)
//!   with faults injected at operation boundaries
//! - `tracked`: the structures wrapped with the bookkeeping `lf-core`
//!   checkers read
//!
//! ## Usage
//!
//! ```rust
//! use lf_dst::DstEnv;
//!
//! let seed = 12345;
//! let mut env = DstEnv::new(seed);
//!
//! // Deterministic time
//! env.clock().advance_ns(1_000_000); // 1ms
//! assert_eq!(env.now_ns(), 1_000_000);
//!
//! // Deterministic randomness
//! let _value: u64 = env.rng().gen();
//! let choice = env.rng().gen_range(0..10);
//! assert!(choice < 10);
//!
//! // Deterministic fault injection
//! if env.fault().should_fail() {
//!     // Simulate failure
//! }
//! ```
//!
//! ## Reproducibility
//!
//! To reproduce a failing run:
//! ```bash
//! DST_SEED=12345 cargo test -p lf-dst
//! lf-dst --structure queue --seed 12345
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod harness;
pub mod random;
pub mod runner;
pub mod scheduler;
pub mod tracked;

pub use clock::SimClock;
pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultPreset, FaultStats};
pub use harness::{DstHarness, HarnessConfig, HarnessResult, Workload};
pub use random::DeterministicRng;
pub use runner::{
    run_all, run_structure, CacheOp, CacheWorkload, ContainerOp, ContainerWorkload, DstError,
    DstReport, DstStats, FaultPoint, FaultType, PropertyOutcome, RunConfig, Structure,
    TrackedContainer,
};
pub use scheduler::{ScheduleDecision, Scheduler};
pub use tracked::{ReferenceLru, TrackedCache, TrackedQueue, TrackedRing, TrackedStack};

use tracing::warn;

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED").map(|s| s.parse::<u64>()) {
        Ok(Ok(seed)) => {
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Ok(Err(e)) => {
            warn!(error = %e, "DST_SEED is not a valid u64, generating one");
            let seed = rand::random::<u64>();
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
        Err(_) => {
            let seed = rand::random::<u64>();
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}

/// Number of DST iterations from `DST_ITERATIONS`, or `default`.
#[must_use]
pub fn iterations_from_env(default: u64) -> u64 {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
