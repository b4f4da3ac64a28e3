//! Stress run: random workers plus a periodic invariant checker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lrucache::{CacheConfig, ConcurrentCache, StatsSnapshot};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

/// Extra time granted past the run duration before a worker counts as hung
pub const DEFAULT_JOIN_GRACE: Duration = Duration::from_secs(5);

type SharedCache = Arc<dyn ConcurrentCache<u64, u64>>;

/// Parameters of one stress run
#[derive(Debug, Clone)]
pub struct StressPlan {
    pub config: CacheConfig,
    pub threads: usize,
    pub key_space: u64,
    pub duration: Duration,
    pub check_interval: Duration,
    pub join_grace: Duration,
    pub seed: u64,
}

/// Outcome of a stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub capacity: usize,
    pub operations: u64,
    pub ops_per_sec: f64,
    pub checks: u64,
    pub violations: u64,
    pub first_violation: Option<String>,
    pub hung_workers: usize,
    pub final_len: usize,
    pub hit_ratio: f64,
    pub stats: StatsSnapshot,
}

impl StressReport {
    /// No invariant violation was observed and every worker finished
    pub fn passed(&self) -> bool {
        self.violations == 0 && self.hung_workers == 0
    }
}

#[derive(Debug, Default)]
struct CheckerTally {
    checks: u64,
    violations: u64,
    first_violation: Option<String>,
}

impl CheckerTally {
    fn record(&mut self, problem: String) {
        self.violations += 1;
        if self.first_violation.is_none() {
            warn!("invariant violation: {}", problem);
            self.first_violation = Some(problem);
        }
    }
}

/// Execute `plan` and collect a report
pub fn run(plan: &StressPlan) -> Result<StressReport> {
    let cache: SharedCache = plan
        .config
        .build_shared()
        .context("building cache for stress run")?;
    run_with(plan, cache)
}

/// Execute `plan` against an already built cache
pub fn run_with(plan: &StressPlan, cache: SharedCache) -> Result<StressReport> {
    let stop = Arc::new(AtomicBool::new(false));
    let tally = Arc::new(Mutex::new(CheckerTally::default()));
    let started = Instant::now();
    let deadline = started + plan.duration;

    let (done_tx, done_rx) = mpsc::channel();
    for worker in 0..plan.threads {
        let cache = Arc::clone(&cache);
        let done_tx = done_tx.clone();
        let seed = plan.seed.wrapping_add(worker as u64);
        let key_space = plan.key_space;
        // Workers stop on their own at the deadline, so an early return
        // here leaves nothing running past it.
        thread::Builder::new()
            .name(format!("lrustress-worker-{}", worker))
            .spawn(move || {
                let ops = run_worker(cache.as_ref(), seed, key_space, deadline);
                // The receiver is gone only if the run already gave up on us.
                let _ = done_tx.send(ops);
            })
            .context("spawning worker thread")?;
    }
    drop(done_tx);

    let checker = spawn_checker(
        Arc::clone(&cache),
        Arc::clone(&stop),
        Arc::clone(&tally),
        plan.check_interval,
    )?;

    let mut operations = 0u64;
    let mut finished = 0usize;
    let join_deadline = deadline + plan.join_grace;
    while finished < plan.threads {
        let wait = join_deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(wait) {
            Ok(ops) => {
                operations += ops;
                finished += 1;
            }
            Err(_) => break,
        }
    }
    let elapsed = started.elapsed();
    let hung_workers = plan.threads - finished;

    stop.store(true, Ordering::Release);

    if hung_workers == 0 {
        checker
            .join()
            .map_err(|_| anyhow::anyhow!("checker thread panicked"))?;
        if let Err(e) = cache.validate() {
            tally.lock().record(format!("final check: {}", e));
        }
    } else {
        // The checker may itself be stuck on the cache's lock; read what it
        // recorded so far instead of joining it.
        warn!(hung_workers, "workers did not finish; cache may be deadlocked");
    }

    let tally = std::mem::take(&mut *tally.lock());
    let stats = cache.stats().snapshot();
    let secs = elapsed.as_secs_f64();
    Ok(StressReport {
        threads: plan.threads,
        capacity: cache.capacity(),
        operations,
        ops_per_sec: if secs > 0.0 { operations as f64 / secs } else { 0.0 },
        checks: tally.checks,
        violations: tally.violations,
        first_violation: tally.first_violation,
        hung_workers,
        final_len: if hung_workers == 0 { cache.len() } else { 0 },
        hit_ratio: cache.stats().hit_ratio(),
        stats,
    })
}

/// Random mix: 50% get, 40% put, 10% remove
fn run_worker(
    cache: &dyn ConcurrentCache<u64, u64>,
    seed: u64,
    key_space: u64,
    deadline: Instant,
) -> u64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ops = 0u64;

    while Instant::now() < deadline {
        let key = rng.gen_range(0..key_space);
        match rng.gen_range(0..10) {
            0..=4 => {
                cache.get(&key);
            }
            5..=8 => cache.put(key, rng.gen()),
            _ => {
                cache.remove(&key);
            }
        }
        ops += 1;
    }

    debug!(seed, ops, "worker finished");
    ops
}

fn spawn_checker(
    cache: SharedCache,
    stop: Arc<AtomicBool>,
    tally: Arc<Mutex<CheckerTally>>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("lrustress-checker".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                let checked = cache.validate();
                let len = cache.len();

                let mut tally = tally.lock();
                if let Err(e) = checked {
                    tally.record(e.to_string());
                }
                if len > cache.capacity() {
                    tally.record(format!("size {} over capacity {}", len, cache.capacity()));
                }
                tally.checks += 1;
                drop(tally);

                thread::sleep(interval);
            }
        });
    spawned.context("spawning checker thread")
}
