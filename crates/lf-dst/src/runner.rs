//! DST runners for each structure, with faults at operation boundaries.
//!
//! DST injects faults at OPERATION BOUNDARIES, not inside CAS sequences.
//! The structures are driven unmodified; faults happen in the workload.
//!
//! # What DST Tests (vs Loom)
//!
//! | Concern | Tool | Level |
//! |---------|------|-------|
//! | CAS races | Loom | Instruction (automatic) |
//! | Allocation failure | DST | Operation boundary |
//! | Thread crash | DST | Operation boundary |
//! | Reclamation timing | DST | Between operations |
//!
//! ```text
//!  FaultPoint (pre-op)  ──>  structure op  ──>  FaultPoint (post-op)
//!  "fail allocation?"                           "crash before return?"
//! ```

use std::fmt;

use lf_core::invariants::{
    QueuePropertyChecker, RecencyCachePropertyChecker, ReclaimPropertyChecker,
    RingBufferPropertyChecker, StackPropertyChecker,
};
use lf_core::{PropertyChecker, PropertyResult};
use lf_structures::CapacityError;
use serde::Serialize;
use tracing::{debug, info};

use crate::harness::{DstHarness, HarnessConfig, HarnessResult, Workload};
use crate::tracked::{TrackedCache, TrackedQueue, TrackedRing, TrackedStack};
use crate::DstEnv;

/// Structure to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Structure {
    Stack,
    Queue,
    Ring,
    Lru,
}

impl Structure {
    pub const ALL: [Structure; 4] = [
        Structure::Stack,
        Structure::Queue,
        Structure::Ring,
        Structure::Lru,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Structure::Stack => "stack",
            Structure::Queue => "queue",
            Structure::Ring => "ring",
            Structure::Lru => "lru",
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fault injection points (between operations, not inside).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Before starting an operation
    BeforeOperation,
    /// After the operation took effect, before the caller sees the result
    AfterOperation,
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultType {
    /// Node allocation fails; the operation never starts
    AllocationFailure,
    /// Caller "crashes"; the operation is abandoned
    ThreadCrash,
    /// Slow thread
    Delay,
    /// Deferred reclamation is flushed to the global collector
    ReclaimFlush,
}

#[derive(Debug, thiserror::Error)]
pub enum DstError {
    #[error("invalid structure configuration: {0}")]
    Capacity(#[from] CapacityError),
}

/// Parameters of one simulated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub seed: u64,
    pub harness: HarnessConfig,
    /// Ring buffer slot count
    pub slots: usize,
    /// Recency cache capacity
    pub cache_capacity: usize,
    /// Key space for cache operations
    pub key_space: u64,
}

impl RunConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            harness: HarnessConfig::default(),
            slots: 8,
            cache_capacity: 4,
            key_space: 8,
        }
    }

    /// Spread `iterations` operations across the configured threads.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        let threads = self.harness.threads_count.max(1) as u64;
        self.harness.operations_per_thread = iterations.div_ceil(threads);
        self
    }
}

/// Counters of fault outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DstStats {
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub failed_allocations: u64,
    pub reclaim_flushes: u64,
}

/// One property in a report.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyOutcome {
    pub name: String,
    pub holds: bool,
    pub violation: Option<String>,
    /// Rendered interleaving leading to the violation
    pub counterexample: Option<String>,
}

impl From<&PropertyResult> for PropertyOutcome {
    fn from(result: &PropertyResult) -> Self {
        Self {
            name: format!("{}::{}", result.structure, result.name),
            holds: result.holds,
            violation: result.violation.clone(),
            counterexample: result.counterexample.as_ref().map(|ce| ce.render_diagram()),
        }
    }
}

/// Report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct DstReport {
    pub structure: Structure,
    pub passed: bool,
    pub harness: HarnessResult,
    pub stats: DstStats,
    pub properties: Vec<PropertyOutcome>,
}

impl DstReport {
    pub fn format(&self) -> String {
        let mut out = format!(
            "{} {} abandoned={} failed_allocs={} flushes={}",
            self.structure,
            self.harness.format(),
            self.stats.abandoned_operations,
            self.stats.failed_allocations,
            self.stats.reclaim_flushes,
        );
        for p in self.properties.iter().filter(|p| !p.holds) {
            out.push_str(&format!(
                "\n  VIOLATION: {}: {}",
                p.name,
                p.violation.as_deref().unwrap_or("")
            ));
            if let Some(diagram) = &p.counterexample {
                for line in diagram.lines() {
                    out.push_str("\n    ");
                    out.push_str(line);
                }
            }
        }
        out
    }
}

/// Pick a fault for this boundary, if one fires.
///
/// Allocation can only fail before an operation has started.
fn maybe_inject_fault(env: &mut DstEnv, point: FaultPoint) -> Option<FaultType> {
    if !env.fault().should_fail() {
        return None;
    }
    let fault = match (point, env.fault().choose(4)) {
        (FaultPoint::BeforeOperation, 0) => FaultType::AllocationFailure,
        (FaultPoint::AfterOperation, 0) | (_, 1) => FaultType::ThreadCrash,
        (_, 2) => FaultType::Delay,
        _ => FaultType::ReclaimFlush,
    };
    Some(fault)
}

/// Stall the current thread for a random simulated duration.
fn inject_delay(env: &mut DstEnv) -> u64 {
    let max = env.fault().config().max_delay_ns.max(1);
    let ns = env.rng().gen_range(1..=max);
    env.clock().advance_ns(ns);
    ns
}

/// Insert/remove operation for the container structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOp {
    Insert(u64),
    Remove,
}

/// A tracked container the container workload can drive.
pub trait TrackedContainer {
    const STRUCTURE: Structure;

    /// Whether inserts allocate (stack and queue nodes do).
    const ALLOCATES: bool;

    /// Returns `true` if the value was accepted.
    fn insert(&mut self, thread_id: u64, value: u64) -> bool;

    fn remove(&mut self, thread_id: u64) -> Option<u64>;

    fn flush_reclamation(&self) {}

    fn check(&self, seed: u64) -> Vec<PropertyResult>;
}

impl TrackedContainer for TrackedStack {
    const STRUCTURE: Structure = Structure::Stack;
    const ALLOCATES: bool = true;

    fn insert(&mut self, thread_id: u64, value: u64) -> bool {
        self.push(thread_id, value);
        true
    }

    fn remove(&mut self, thread_id: u64) -> Option<u64> {
        self.pop(thread_id)
    }

    fn flush_reclamation(&self) {
        TrackedStack::flush_reclamation(self);
    }

    fn check(&self, seed: u64) -> Vec<PropertyResult> {
        let mut results = StackPropertyChecker::new(self).with_seed(seed).check_all();
        results.extend(ReclaimPropertyChecker::new(self).check_all());
        results
    }
}

impl TrackedContainer for TrackedQueue {
    const STRUCTURE: Structure = Structure::Queue;
    const ALLOCATES: bool = true;

    fn insert(&mut self, thread_id: u64, value: u64) -> bool {
        self.enqueue(thread_id, value);
        true
    }

    fn remove(&mut self, thread_id: u64) -> Option<u64> {
        self.dequeue(thread_id)
    }

    fn flush_reclamation(&self) {
        TrackedQueue::flush_reclamation(self);
    }

    fn check(&self, seed: u64) -> Vec<PropertyResult> {
        let mut results = QueuePropertyChecker::new(self).with_seed(seed).check_all();
        results.extend(ReclaimPropertyChecker::new(self).check_all());
        results
    }
}

impl TrackedContainer for TrackedRing {
    const STRUCTURE: Structure = Structure::Ring;
    const ALLOCATES: bool = false;

    fn insert(&mut self, _thread_id: u64, value: u64) -> bool {
        self.try_push(value)
    }

    fn remove(&mut self, _thread_id: u64) -> Option<u64> {
        self.try_pop()
    }

    fn check(&self, seed: u64) -> Vec<PropertyResult> {
        RingBufferPropertyChecker::new(self).with_seed(seed).check_all()
    }
}

/// Random inserts and removes against one tracked container.
pub struct ContainerWorkload<C> {
    container: C,
    seed: u64,
    next_value: u64,
    insert_probability: f64,
    stats: DstStats,
}

impl<C: TrackedContainer> ContainerWorkload<C> {
    pub fn new(container: C, seed: u64) -> Self {
        Self {
            container,
            seed,
            next_value: 1,
            insert_probability: 0.55,
            stats: DstStats::default(),
        }
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn stats(&self) -> &DstStats {
        &self.stats
    }

    pub fn results(&self) -> Vec<PropertyResult> {
        self.container.check(self.seed)
    }

    /// Apply a boundary fault. `true` means the operation must not start.
    fn before(&mut self, env: &mut DstEnv, op: ContainerOp) -> bool {
        let Some(fault) = maybe_inject_fault(env, FaultPoint::BeforeOperation) else {
            return false;
        };
        self.stats.faults_injected += 1;

        match fault {
            FaultType::AllocationFailure if C::ALLOCATES && matches!(op, ContainerOp::Insert(_)) => {
                self.stats.failed_allocations += 1;
                true
            }
            FaultType::AllocationFailure => false,
            FaultType::ThreadCrash => {
                self.stats.abandoned_operations += 1;
                true
            }
            FaultType::Delay => {
                inject_delay(env);
                false
            }
            FaultType::ReclaimFlush => {
                self.container.flush_reclamation();
                self.stats.reclaim_flushes += 1;
                false
            }
        }
    }

    fn after(&mut self, env: &mut DstEnv) {
        let Some(fault) = maybe_inject_fault(env, FaultPoint::AfterOperation) else {
            return;
        };
        self.stats.faults_injected += 1;

        match fault {
            // The operation took effect; the caller never sees the result.
            FaultType::ThreadCrash => self.stats.abandoned_operations += 1,
            FaultType::ReclaimFlush => {
                self.container.flush_reclamation();
                self.stats.reclaim_flushes += 1;
            }
            FaultType::Delay => {
                inject_delay(env);
            }
            FaultType::AllocationFailure => {}
        }
    }
}

impl<C: TrackedContainer> Workload for ContainerWorkload<C> {
    type Op = ContainerOp;

    fn generate(&mut self, env: &mut DstEnv, _thread: usize, _step: u64) -> Option<ContainerOp> {
        if env.rng().gen_bool(self.insert_probability) {
            let value = self.next_value;
            self.next_value += 1;
            Some(ContainerOp::Insert(value))
        } else {
            Some(ContainerOp::Remove)
        }
    }

    fn execute(&mut self, env: &mut DstEnv, thread: usize, op: ContainerOp) -> Result<(), String> {
        if self.before(env, op) {
            return Ok(());
        }

        match op {
            ContainerOp::Insert(value) => {
                self.container.insert(thread as u64, value);
            }
            ContainerOp::Remove => {
                self.container.remove(thread as u64);
            }
        }

        self.after(env);
        Ok(())
    }

    fn check_invariants(&mut self) -> Result<(), String> {
        match self.results().into_iter().find(|r| !r.holds) {
            Some(failure) => Err(failure.to_string()),
            None => Ok(()),
        }
    }
}

/// Cache operation over a small key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Get(u64),
    Set(u64, u64),
    Remove(u64),
}

/// Random get/set/remove against a tracked recency cache.
pub struct CacheWorkload {
    cache: TrackedCache,
    key_space: u64,
    stats: DstStats,
}

impl CacheWorkload {
    pub fn new(cache: TrackedCache, key_space: u64) -> Self {
        Self {
            cache,
            key_space: key_space.max(1),
            stats: DstStats::default(),
        }
    }

    pub fn cache(&self) -> &TrackedCache {
        &self.cache
    }

    pub fn stats(&self) -> &DstStats {
        &self.stats
    }

    pub fn results(&self) -> Vec<PropertyResult> {
        let mut results = RecencyCachePropertyChecker::new(&self.cache).check_all();
        results.push(match self.cache.mismatches().first() {
            None => PropertyResult::pass("recency_cache", "ResultAgreement"),
            Some(first) => PropertyResult::fail(
                "recency_cache",
                "ResultAgreement",
                format!(
                    "{} operations disagreed with the reference LRU, first: {}",
                    self.cache.mismatches().len(),
                    first
                ),
                None,
            ),
        });
        results
    }
}

impl Workload for CacheWorkload {
    type Op = CacheOp;

    fn generate(&mut self, env: &mut DstEnv, _thread: usize, step: u64) -> Option<CacheOp> {
        let key = env.rng().gen_range(0..self.key_space);
        let op = match env.rng().gen_range(0..10) {
            0..=3 => CacheOp::Get(key),
            4..=8 => CacheOp::Set(key, step),
            _ => CacheOp::Remove(key),
        };
        Some(op)
    }

    fn execute(&mut self, env: &mut DstEnv, _thread: usize, op: CacheOp) -> Result<(), String> {
        if let Some(fault) = maybe_inject_fault(env, FaultPoint::BeforeOperation) {
            self.stats.faults_injected += 1;
            match fault {
                FaultType::ThreadCrash => {
                    self.stats.abandoned_operations += 1;
                    return Ok(());
                }
                FaultType::AllocationFailure if matches!(op, CacheOp::Set(..)) => {
                    self.stats.failed_allocations += 1;
                    return Ok(());
                }
                FaultType::Delay => {
                    inject_delay(env);
                }
                FaultType::AllocationFailure | FaultType::ReclaimFlush => {}
            }
        }

        match op {
            CacheOp::Get(key) => {
                self.cache.get(key);
            }
            CacheOp::Set(key, value) => {
                if self.cache.set(key, value).is_some() {
                    debug!(key, "cache evicted an entry");
                }
            }
            CacheOp::Remove(key) => {
                self.cache.remove(key);
            }
        }
        Ok(())
    }

    fn check_invariants(&mut self) -> Result<(), String> {
        match self.results().into_iter().find(|r| !r.holds) {
            Some(failure) => Err(failure.to_string()),
            None => Ok(()),
        }
    }
}

fn finish(
    structure: Structure,
    harness: HarnessResult,
    stats: DstStats,
    results: &[PropertyResult],
) -> DstReport {
    let properties: Vec<PropertyOutcome> = results.iter().map(PropertyOutcome::from).collect();
    let passed = harness.all_invariants_held && properties.iter().all(|p| p.holds);

    info!(
        structure = %structure,
        seed = harness.seed,
        passed,
        ops = harness.operations_count,
        faults = harness.faults_injected_count,
        "DST run finished"
    );

    DstReport {
        structure,
        passed,
        harness,
        stats,
        properties,
    }
}

fn run_container<C: TrackedContainer>(container: C, config: &RunConfig) -> DstReport {
    let mut harness = DstHarness::new(config.seed, config.harness.clone());
    let mut workload = ContainerWorkload::new(container, config.seed);
    let result = harness.run(&mut workload);
    finish(
        C::STRUCTURE,
        result,
        workload.stats().clone(),
        &workload.results(),
    )
}

/// Run one seeded simulation of `structure`.
pub fn run_structure(structure: Structure, config: &RunConfig) -> Result<DstReport, DstError> {
    debug!(structure = %structure, seed = config.seed, "starting DST run");

    let report = match structure {
        Structure::Stack => run_container(TrackedStack::new(), config),
        Structure::Queue => run_container(TrackedQueue::new(), config),
        Structure::Ring => run_container(TrackedRing::new(config.slots)?, config),
        Structure::Lru => {
            let mut harness = DstHarness::new(config.seed, config.harness.clone());
            let mut workload = CacheWorkload::new(
                TrackedCache::new(config.cache_capacity)?,
                config.key_space,
            );
            let result = harness.run(&mut workload);
            finish(
                Structure::Lru,
                result,
                workload.stats().clone(),
                &workload.results(),
            )
        }
    };

    Ok(report)
}

/// Run every structure with the same seed.
pub fn run_all(config: &RunConfig) -> Result<Vec<DstReport>, DstError> {
    Structure::ALL
        .iter()
        .map(|s| run_structure(*s, config))
        .collect()
}
