//! lrustress - hammer a shared LRU cache from many threads and check it

mod stress;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use lrucache::{CacheConfig, RecencyMode};
use tracing::{error, info};

use crate::stress::{StressPlan, StressReport, DEFAULT_JOIN_GRACE};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Serialized, exact LRU
    Exact,
    /// Shared reads, approximate LRU
    Lazy,
}

impl From<Mode> for RecencyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Exact => RecencyMode::Exact,
            Mode::Lazy => RecencyMode::Lazy,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Worker threads
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Cache capacity (number of items)
    #[arg(short, long, default_value_t = 16)]
    capacity: usize,

    /// Size of the key space workers draw from
    #[arg(short, long, default_value_t = 64)]
    keys: u64,

    /// How long workers run
    #[arg(short, long, default_value_t = 2000)]
    duration_ms: u64,

    /// Recency mode
    #[arg(short, long, value_enum, default_value_t = Mode::Exact)]
    mode: Mode,

    /// Base RNG seed; worker i uses seed + i
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Pause between invariant checks
    #[arg(long, default_value_t = 5)]
    check_interval_ms: u64,

    /// JSON cache config; overrides --capacity and --mode
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn cache_config(&self) -> Result<CacheConfig> {
        let config = match &self.config {
            Some(path) => CacheConfig::from_file(path)
                .with_context(|| format!("loading cache config {}", path.display()))?,
            None => CacheConfig {
                capacity: self.capacity,
                recency: self.mode.into(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    if args.keys == 0 {
        bail!("--keys must be at least 1");
    }

    let config = args.cache_config()?;
    info!("Starting lrustress v{}", env!("CARGO_PKG_VERSION"));
    info!(
        threads = args.threads,
        capacity = config.capacity,
        recency = ?config.recency,
        keys = args.keys,
        duration_ms = args.duration_ms,
        "stress plan"
    );

    let plan = StressPlan {
        config,
        threads: args.threads,
        key_space: args.keys,
        duration: Duration::from_millis(args.duration_ms),
        check_interval: Duration::from_millis(args.check_interval_ms),
        join_grace: DEFAULT_JOIN_GRACE,
        seed: args.seed,
    };

    let report = stress::run(&plan)?;
    print_report(&report, args.json)?;

    if !report.passed() {
        error!(
            violations = report.violations,
            hung_workers = report.hung_workers,
            "stress run failed"
        );
        bail!("stress run failed");
    }
    Ok(())
}

fn print_report(report: &StressReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let ops_per_sec = report.ops_per_sec as u64;
    info!(
        operations = report.operations,
        ops_per_sec,
        checks = report.checks,
        violations = report.violations,
        final_len = report.final_len,
        hit_ratio = report.hit_ratio,
        evictions = report.stats.evictions,
        "stress run finished"
    );
    if let Some(first) = &report.first_violation {
        error!("first violation: {}", first);
    }
    Ok(())
}
