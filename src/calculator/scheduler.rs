//! Fans repetitions out over a worker pool and gathers their results
//!
//! Architecture:
//! - One rayon pool per calculation, one job per worker
//! - Each job owns a contiguous range of repetition indices
//! - Results come back over a crossbeam channel
//! - The collector polls so it can notice cancellation and timeouts

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::battle::resolver::{BattleSetup, CombatResolver};
use crate::calculator::repetition::{run_one, RepetitionResult};
use crate::core::config::SnapshotMode;
use crate::core::error::{OddsError, Result};
use crate::policy::SidePolicies;
use crate::world::snapshot::WorldSnapshot;

/// How often the collector wakes up to check flags
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock the shared snapshot, recovering from a poisoned lock
///
/// A panicking repetition has already been rolled back by its change scope
/// by the time the lock is released.
pub(crate) fn lock_snapshot(snapshot: &Mutex<WorldSnapshot>) -> MutexGuard<'_, WorldSnapshot> {
    snapshot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a worker needs, owned so stragglers can outlive a timed-out
/// calculation
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub snapshot: Arc<Mutex<WorldSnapshot>>,
    pub battle: Arc<BattleSetup>,
    pub policies: SidePolicies,
    pub resolver: Arc<dyn CombatResolver>,
    pub seed: Option<u64>,
    pub mode: SnapshotMode,
    /// Caller-visible cancel flag
    pub cancel: Arc<AtomicBool>,
    /// Set once the collector has given up on this calculation
    pub stop: Arc<AtomicBool>,
}

impl WorkerContext {
    fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::Acquire) || self.stop.load(Ordering::Acquire)
    }
}

/// Sizing and deadlines for one calculation
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    pub runs: u32,
    pub threads: usize,
    pub shutdown_timeout: Duration,
    pub time_limit: Option<Duration>,
}

/// What the collector gathered
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub results: Vec<RepetitionResult>,
    pub dropped: usize,
    pub cancelled: bool,
}

enum WorkerMessage {
    Completed(u32, RepetitionResult),
    Failed(u32, OddsError),
    Panicked(u32),
}

/// Random source for one worker
enum RngSource {
    /// Repetition `i` draws from stream `i` of the generator keyed by `seed`
    Seeded(u64),
    /// One entropy-seeded stream for the whole worker
    Stream(ChaCha8Rng),
}

impl RngSource {
    fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => RngSource::Seeded(seed),
            None => RngSource::Stream(ChaCha8Rng::from_entropy()),
        }
    }

    fn with_rng<T>(&mut self, index: u32, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        match self {
            RngSource::Seeded(seed) => {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                rng.set_stream(u64::from(index));
                f(&mut rng)
            }
            RngSource::Stream(rng) => f(rng),
        }
    }
}

/// Sets the stop flag when the collector returns, however it returns
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Split `0..runs` into `workers` contiguous, near-equal ranges
fn partition(runs: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u64;
    let runs = u64::from(runs);
    (0..workers)
        .map(|w| ((runs * w / workers) as u32)..((runs * (w + 1) / workers) as u32))
        .filter(|r| !r.is_empty())
        .collect()
}

fn worker(ctx: WorkerContext, indices: Range<u32>, tx: Sender<WorkerMessage>) {
    let mut private = match ctx.mode {
        SnapshotMode::PerWorker => Some(lock_snapshot(&ctx.snapshot).clone()),
        SnapshotMode::Shared => None,
    };
    let mut rng_source = RngSource::new(ctx.seed);

    for index in indices {
        if ctx.should_stop() {
            break;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            rng_source.with_rng(index, |rng| match private.as_mut() {
                Some(world) => run_one(world, &ctx.battle, &ctx.policies, ctx.resolver.as_ref(), rng),
                None => {
                    let mut world = lock_snapshot(&ctx.snapshot);
                    run_one(&mut world, &ctx.battle, &ctx.policies, ctx.resolver.as_ref(), rng)
                }
            })
        }));
        let message = match outcome {
            Ok(Ok(result)) => WorkerMessage::Completed(index, result),
            Ok(Err(e)) => WorkerMessage::Failed(index, e),
            Err(_) => WorkerMessage::Panicked(index),
        };
        if tx.send(message).is_err() {
            // Collector already returned
            break;
        }
    }
}

/// Run `schedule.runs` repetitions and collect what finishes in time
pub(crate) fn run_repetitions(ctx: WorkerContext, schedule: Schedule) -> Result<Collected> {
    let mut collected = Collected::default();
    if schedule.runs == 0 {
        return Ok(collected);
    }
    let mut completed: Vec<(u32, RepetitionResult)> = Vec::new();

    let _stop = StopOnDrop(ctx.stop.clone());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(schedule.threads)
        .thread_name(|i| format!("odds-worker-{}", i))
        .build()?;

    let (tx, rx) = unbounded();
    for range in partition(schedule.runs, schedule.threads) {
        let ctx = ctx.clone();
        let tx = tx.clone();
        pool.spawn(move || worker(ctx, range, tx));
    }
    drop(tx);

    let started = Instant::now();
    let mut stopping_since: Option<Instant> = None;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(WorkerMessage::Completed(index, result)) => completed.push((index, result)),
            Ok(WorkerMessage::Failed(index, e)) => {
                tracing::warn!("Dropping repetition {}: {}", index, e);
                collected.dropped += 1;
            }
            Ok(WorkerMessage::Panicked(index)) => {
                tracing::warn!("Dropping repetition {}: resolver panicked", index);
                collected.dropped += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if stopping_since.is_none() {
            if ctx.cancel.load(Ordering::Acquire) {
                tracing::debug!("Cancellation observed after {} repetitions", completed.len());
                collected.cancelled = true;
                stopping_since = Some(Instant::now());
            } else if schedule.time_limit.is_some_and(|limit| started.elapsed() >= limit) {
                tracing::warn!("Time limit reached after {} repetitions", completed.len());
                ctx.stop.store(true, Ordering::Release);
                collected.cancelled = true;
                stopping_since = Some(Instant::now());
            }
        }
        if let Some(since) = stopping_since {
            if since.elapsed() >= schedule.shutdown_timeout {
                tracing::warn!(
                    "Workers still busy {:?} after stop request; returning partial results",
                    schedule.shutdown_timeout
                );
                break;
            }
        }
    }
    // Workers may have seen the flag and exited before the collector did
    collected.cancelled |= ctx.cancel.load(Ordering::Acquire);

    // Arrival order depends on thread timing; index order does not
    completed.sort_by_key(|(index, _)| *index);
    collected.results = completed.into_iter().map(|(_, result)| result).collect();

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_all_runs() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
        let total: u32 = ranges.iter().map(|r| r.len() as u32).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_partition_skips_empty_ranges() {
        assert_eq!(partition(2, 4), vec![0..1, 1..2]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        use rand::Rng;
        let mut a = RngSource::new(Some(100));
        let mut b = RngSource::new(Some(100));
        let x: u64 = a.with_rng(5, |rng| rng.gen());
        let y: u64 = b.with_rng(5, |rng| rng.gen());
        assert_eq!(x, y);
    }

    #[test]
    fn test_neighbouring_seeds_share_no_streams() {
        use rand::Rng;
        let draws = |seed: u64| -> Vec<u64> {
            let mut source = RngSource::new(Some(seed));
            (0..32).map(|i| source.with_rng(i, |rng| rng.gen())).collect()
        };
        let first = draws(100);
        let second = draws(101);
        assert!(first.iter().all(|x| !second.contains(x)));

        // Distinct repetitions of one seed differ too
        let mut unique = first.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn test_poisoned_snapshot_is_recovered() {
        let snapshot = Arc::new(Mutex::new(WorldSnapshot::default()));
        let clone = snapshot.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(snapshot.is_poisoned());
        assert_eq!(lock_snapshot(&snapshot).unit_count(), 0);
    }
}
