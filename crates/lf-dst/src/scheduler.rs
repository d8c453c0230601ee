//! Deterministic choice of which logical thread runs next.

use crate::random::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread
    Continue,
    /// Switch to the given thread
    SwitchTo(usize),
}

/// Picks context switches at yield points.
#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    current: usize,
    yield_probability: f64,
    switches_count: u64,
}

impl Scheduler {
    pub fn new(rng: DeterministicRng, threads_count: usize, yield_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "Scheduler needs at least one thread");

        Self {
            rng,
            threads_count: threads_count.max(1),
            current: 0,
            yield_probability,
            switches_count: 0,
        }
    }

    pub fn current_thread(&self) -> usize {
        self.current
    }

    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    pub fn switches_count(&self) -> u64 {
        self.switches_count
    }

    /// Decide at a yield point.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count == 1 || !self.rng.gen_bool(self.yield_probability) {
            return ScheduleDecision::Continue;
        }
        let next = self.pick_other();
        self.switch_to(next);
        ScheduleDecision::SwitchTo(next)
    }

    /// Switch away from the current thread unconditionally.
    pub fn force_switch(&mut self) -> usize {
        if self.threads_count > 1 {
            let next = self.pick_other();
            self.switch_to(next);
        }
        self.current
    }

    fn pick_other(&mut self) -> usize {
        let offset = self.rng.gen_range(1..self.threads_count);
        (self.current + offset) % self.threads_count
    }

    fn switch_to(&mut self, thread: usize) {
        self.current = thread;
        self.switches_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_never_switches() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(3), 1, 1.0);
        for _ in 0..100 {
            assert_eq!(scheduler.decide(), ScheduleDecision::Continue);
        }
        assert_eq!(scheduler.force_switch(), 0);
    }

    #[test]
    fn test_switch_targets_another_thread() {
        let mut scheduler = Scheduler::new(DeterministicRng::new(3), 4, 1.0);
        for _ in 0..100 {
            let before = scheduler.current_thread();
            match scheduler.decide() {
                ScheduleDecision::SwitchTo(t) => {
                    assert_ne!(t, before);
                    assert!(t < 4);
                }
                ScheduleDecision::Continue => panic!("yield_probability 1.0 must switch"),
            }
        }
        assert_eq!(scheduler.switches_count(), 100);
    }

    #[test]
    fn test_deterministic() {
        let run = |seed| {
            let mut s = Scheduler::new(DeterministicRng::new(seed), 3, 0.5);
            (0..50).map(|_| s.decide()).collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }
}
