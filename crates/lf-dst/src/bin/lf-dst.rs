//! lf-dst: run deterministic simulations of the lock-free primitives.
//!
//! # Usage
//!
//! ```bash
//! lf-dst --structure all --iterations 1000 --faults aggressive
//! lf-dst --structure ring --seed 12345 --slots 8 --json
//! ```
//!
//! Exits with status 1 if any property is violated. The seed of every run
//! is printed so a failure can be replayed with `--seed` or `DST_SEED`.

use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lf_dst::{run_structure, DstReport, FaultConfig, FaultPreset, RunConfig, Structure};

/// Maximum logical threads the scheduler simulates.
const THREADS_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Stack,
    Queue,
    Ring,
    Lru,
    All,
}

impl Target {
    fn structures(self) -> Vec<Structure> {
        match self {
            Target::Stack => vec![Structure::Stack],
            Target::Queue => vec![Structure::Queue],
            Target::Ring => vec![Structure::Ring],
            Target::Lru => vec![Structure::Lru],
            Target::All => Structure::ALL.to_vec(),
        }
    }
}

/// Run seeded simulations and check every structure's properties.
#[derive(Parser, Debug)]
#[command(name = "lf-dst")]
#[command(about = "Deterministic simulation testing for the lock-free primitives")]
struct Cli {
    /// Structure to simulate.
    #[arg(long, value_enum, default_value = "all")]
    structure: Target,

    /// DST seed (random if not set).
    #[arg(long, env = "DST_SEED")]
    seed: Option<u64>,

    /// Total operations per structure.
    #[arg(long, env = "DST_ITERATIONS", default_value_t = 1000)]
    iterations: u64,

    /// Logical threads to interleave.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Ring buffer slot count (usable capacity is one less).
    #[arg(long, default_value_t = 8)]
    slots: usize,

    /// Recency cache capacity.
    #[arg(long, default_value_t = 4)]
    capacity: usize,

    /// Fault preset.
    #[arg(long, value_enum, default_value = "default")]
    faults: FaultPreset,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> Result<RunConfig> {
    if cli.threads == 0 || cli.threads > THREADS_MAX {
        bail!("--threads must be between 1 and {THREADS_MAX}, got {}", cli.threads);
    }
    let fault_config = FaultConfig::from(cli.faults);

    let seed = cli.seed.unwrap_or_else(|| {
        let seed = rand::random::<u64>();
        eprintln!("DST_SEED={seed} (randomly generated)");
        seed
    });

    let mut config = RunConfig::new(seed);
    config.harness.threads_count = cli.threads;
    config.harness.fault_config = fault_config;
    config.slots = cli.slots;
    config.cache_capacity = cli.capacity;
    Ok(config.with_iterations(cli.iterations))
}

fn run(cli: &Cli) -> Result<bool> {
    let config = build_config(cli)?;

    let reports: Vec<DstReport> = cli
        .structure
        .structures()
        .into_iter()
        .map(|s| run_structure(s, &config).with_context(|| format!("running {s}")))
        .collect::<Result<_>>()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", report.format());
        }
    }

    Ok(reports.iter().all(|r| r.passed))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_preset_parsed_by_clap() {
        let cli = Cli::try_parse_from(["lf-dst", "--faults", "aggressive", "--seed", "3"]).unwrap();
        assert_eq!(cli.faults, FaultPreset::Aggressive);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.harness.fault_config, FaultConfig::aggressive());
    }

    #[test]
    fn test_unknown_fault_preset_rejected() {
        let err = Cli::try_parse_from(["lf-dst", "--faults", "chaos"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
