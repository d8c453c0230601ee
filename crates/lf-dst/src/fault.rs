//! Deterministic fault decisions.
//!
//! The injector only decides *whether* a fault happens at a boundary. What
//! the fault means for the operation is up to the runner.

use serde::Serialize;

use crate::random::DeterministicRng;

/// Fault probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultConfig {
    /// Chance that a boundary check yields a fault
    pub failure_probability: f64,
    /// Chance that a boundary check yields a delay
    pub delay_probability: f64,
    /// Upper bound for one simulated delay
    pub max_delay_ns: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.01,
            delay_probability: 0.05,
            max_delay_ns: 1_000_000,
        }
    }
}

impl FaultConfig {
    /// No faults, no delays.
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            max_delay_ns: 0,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.1,
            delay_probability: 0.2,
            max_delay_ns: 10_000_000,
        }
    }

}

/// Named fault configurations, selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FaultPreset {
    None,
    Default,
    Aggressive,
}

impl From<FaultPreset> for FaultConfig {
    fn from(preset: FaultPreset) -> Self {
        match preset {
            FaultPreset::None => Self::none(),
            FaultPreset::Default => Self::default(),
            FaultPreset::Aggressive => Self::aggressive(),
        }
    }
}

/// Counters of injected faults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
    pub delayed_ns: u64,
}

/// Decides faults from its own RNG stream.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "failure_probability out of range: {}",
            config.failure_probability
        );

        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn stats(&self) -> &FaultStats {
        &self.stats
    }

    /// Should the current boundary fail?
    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        let fail = self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Maybe pick a delay, in nanoseconds.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        if self.config.max_delay_ns == 0 || !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        let ns = self.rng.gen_range(1..=self.config.max_delay_ns);
        self.stats.delays_count += 1;
        self.stats.delayed_ns += ns;
        Some(ns)
    }

    /// Pick one of `choices` outcomes for a fault that already fired.
    pub fn choose(&mut self, choices: usize) -> usize {
        debug_assert!(choices > 0);
        self.rng.gen_range(0..choices)
    }
}
