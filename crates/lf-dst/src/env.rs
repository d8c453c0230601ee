//! The simulated world a DST run executes in.

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

/// Seeded RNG, clock, fault injector and optional scheduler.
///
/// Each component draws from its own stream derived from the seed, so
/// adding a fault check does not shift the operation sequence.
#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, FaultConfig::default())
    }

    pub fn with_faults(seed: u64, fault_config: FaultConfig) -> Self {
        let rng = DeterministicRng::new(seed);
        let fault = FaultInjector::new(rng.fork(1), fault_config);

        Self {
            seed,
            rng,
            clock: SimClock::new(),
            fault,
            scheduler: None,
        }
    }

    /// Add a scheduler for `threads_count` logical threads.
    #[must_use]
    pub fn with_scheduler(mut self, threads_count: usize, yield_probability: f64) -> Self {
        self.scheduler = Some(Scheduler::new(
            self.rng.fork(2),
            threads_count,
            yield_probability,
        ));
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Maybe advance the clock by a simulated delay.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        let ns = self.fault.maybe_delay()?;
        self.clock.advance_ns(ns);
        Some(ns)
    }
}
