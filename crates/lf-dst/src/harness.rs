//! DST test harness for running reproducible interleaved tests.
//!
//! The harness provides a structured way to run DST tests with:
//! - Configurable number of logical threads
//! - Deterministic scheduling
//! - Fault injection
//! - Invariant checking every N operations

use serde::Serialize;
use tracing::warn;

use crate::{DstEnv, FaultConfig, ScheduleDecision};

/// Configuration for DST test harness.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    /// Number of logical threads to simulate
    pub threads_count: usize,
    /// Number of operations per thread
    pub operations_per_thread: u64,
    /// Probability of context switch at yield points
    pub yield_probability: f64,
    /// Fault injection configuration
    pub fault_config: FaultConfig,
    /// Check invariants after every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 250,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 50,
        }
    }
}

impl HarnessConfig {
    /// Configuration for stress testing.
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 200,
        }
    }

    /// Configuration for quick testing.
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }
}

/// Operations driven by the harness.
pub trait Workload {
    type Op;

    /// Next operation for `thread` at its `step`, or `None` to skip.
    fn generate(&mut self, env: &mut DstEnv, thread: usize, step: u64) -> Option<Self::Op>;

    /// Execute one operation. `Err` stops the run with a violation.
    fn execute(&mut self, env: &mut DstEnv, thread: usize, op: Self::Op) -> Result<(), String>;

    /// Check invariants. `Err` stops the run with a violation.
    fn check_invariants(&mut self) -> Result<(), String>;
}

/// Result of running the harness.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessResult {
    /// Seed used for reproduction
    pub seed: u64,
    /// Total operations executed
    pub operations_count: u64,
    /// Context switches that occurred
    pub context_switches_count: u64,
    /// Faults injected
    pub faults_injected_count: u64,
    /// Invariant checks performed
    pub invariant_checks_count: u64,
    /// Simulated time at the end of the run
    pub simulated_ns: u64,
    /// Whether all invariants held
    pub all_invariants_held: bool,
    /// First violation (if any)
    pub first_violation: Option<String>,
}

/// DST test harness.
///
/// Given the same seed and workload, the same interleaving is produced.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: u64,
    context_switches_count: u64,
    invariant_checks_count: u64,
    violation: Option<String>,
}

impl DstHarness {
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(config.threads_count > 0, "Must have at least one thread");
        debug_assert!(
            config.threads_count <= 64,
            "Too many threads for DST: {}",
            config.threads_count
        );

        let env = DstEnv::with_faults(seed, config.fault_config.clone())
            .with_scheduler(config.threads_count.max(1), config.yield_probability);

        Self {
            env,
            config,
            operations_count: 0,
            context_switches_count: 0,
            invariant_checks_count: 0,
            violation: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Get the environment for custom operations.
    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    pub fn is_stopped(&self) -> bool {
        self.violation.is_some()
    }

    /// Stop the harness with a violation message. The first one wins.
    pub fn stop_with_violation(&mut self, message: String) {
        if self.violation.is_none() {
            warn!(seed = self.env.seed(), violation = %message, "DST invariant violated");
            self.violation = Some(message);
        }
    }

    /// Yield point - potentially switch to another thread.
    fn yield_point(&mut self) -> ScheduleDecision {
        let decision = match self.env.scheduler() {
            Some(scheduler) => scheduler.decide(),
            None => ScheduleDecision::Continue,
        };
        if decision != ScheduleDecision::Continue {
            self.context_switches_count += 1;
        }
        decision
    }

    fn current_thread(&mut self) -> usize {
        self.env.scheduler().map_or(0, |s| s.current_thread())
    }

    fn should_check_invariants(&self) -> bool {
        self.config.invariant_check_interval != 0
            && self.operations_count % self.config.invariant_check_interval == 0
    }

    fn check(&mut self, workload: &mut impl Workload) {
        self.invariant_checks_count += 1;
        if let Err(e) = workload.check_invariants() {
            self.stop_with_violation(e);
        }
    }

    /// Run the workload, interleaving logical threads per the scheduler.
    pub fn run<W: Workload>(&mut self, workload: &mut W) -> HarnessResult {
        let threads_count = self.config.threads_count.max(1);
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps: Vec<u64> = vec![0; threads_count];

        while !self.is_stopped() {
            let current = self.current_thread();

            if thread_steps[current] >= ops_per_thread {
                if thread_steps.iter().all(|&s| s >= ops_per_thread) {
                    break;
                }
                if let Some(scheduler) = self.env.scheduler() {
                    scheduler.force_switch();
                }
                self.context_switches_count += 1;
                continue;
            }

            let step = thread_steps[current];
            if let Some(op) = workload.generate(&mut self.env, current, step) {
                if let Err(e) = workload.execute(&mut self.env, current, op) {
                    self.stop_with_violation(format!("Thread {}: {}", current, e));
                    break;
                }
                self.operations_count += 1;

                if self.should_check_invariants() {
                    self.check(workload);
                }
            }
            thread_steps[current] += 1;

            self.env.maybe_delay();
            self.yield_point();
        }

        if !self.is_stopped() {
            self.check(workload);
        }

        self.build_result()
    }

    fn build_result(&mut self) -> HarnessResult {
        HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            context_switches_count: self.context_switches_count,
            faults_injected_count: self.env.fault().stats().faults_count,
            invariant_checks_count: self.invariant_checks_count,
            simulated_ns: self.env.now_ns(),
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
        }
    }
}

impl HarnessResult {
    /// Format for display.
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held {
            "PASS"
        } else {
            "FAIL"
        };

        let mut result = format!(
            "[{}] DST_SEED={} ops={} switches={} faults={} checks={} sim_time={}ns",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count,
            self.simulated_ns
        );

        if let Some(ref violation) = self.first_violation {
            result.push_str(&format!("\n  Violation: {}", violation));
        }

        result
    }
}
