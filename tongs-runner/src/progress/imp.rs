// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolTestCaseAccumulator, RetryDecision, RetryWatchdog};
use crate::{
    config::RetryQuota,
    pool::PoolName,
    reporter::TestCaseRunResult,
    test_case::TestIdentifier,
    time::{StopwatchStart, stopwatch},
};
use indexmap::IndexMap;
use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::{info, warn};

/// Progress of a single pool: how many of its scheduled test cases have a final result.
#[derive(Debug)]
pub struct PoolProgressTracker {
    scheduled: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl PoolProgressTracker {
    /// Creates a tracker for a pool with `scheduled` test cases.
    pub fn new(scheduled: usize) -> Self {
        Self {
            scheduled,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Returns a snapshot of this tracker.
    pub fn snapshot(&self) -> PoolProgress {
        PoolProgress {
            scheduled: self.scheduled,
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }

    fn on_final_result(&self, failed: bool) -> PoolProgress {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let failed = if failed {
            self.failed.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.failed.load(Ordering::Acquire)
        };
        PoolProgress {
            scheduled: self.scheduled,
            completed,
            failed,
        }
    }
}

/// A point-in-time view of a pool's progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PoolProgress {
    /// The number of test cases scheduled in the pool.
    pub scheduled: usize,
    /// The number of test cases with a final result.
    pub completed: usize,
    /// The number of final results that were failures.
    pub failed: usize,
}

impl PoolProgress {
    /// Returns the fraction of scheduled test cases that are complete, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.scheduled == 0 {
            1.0
        } else {
            self.completed as f64 / self.scheduled as f64
        }
    }
}

/// The shared, run-wide store of progress and failure counts, and the sole retry gate.
///
/// One instance exists per run. It is queried and mutated concurrently by every device worker
/// in every pool.
#[derive(Debug)]
pub struct OverallProgressReporter {
    accumulator: PoolTestCaseAccumulator,
    watchdog: RetryWatchdog,
    pools: IndexMap<PoolName, PoolProgressTracker>,
    clock: Mutex<RunClock>,
}

impl OverallProgressReporter {
    /// Creates a reporter for the given pools, each with its number of scheduled test cases.
    pub fn new(quota: RetryQuota, pools: impl IntoIterator<Item = (PoolName, usize)>) -> Self {
        Self {
            accumulator: PoolTestCaseAccumulator::new(),
            watchdog: RetryWatchdog::new(quota),
            pools: pools
                .into_iter()
                .map(|(pool, scheduled)| (pool, PoolProgressTracker::new(scheduled)))
                .collect(),
            clock: Mutex::new(RunClock::NotStarted),
        }
    }

    /// Marks the start of the run.
    pub fn start(&self) {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) =
            RunClock::Running(stopwatch());
    }

    /// Marks the end of the run, freezing [`elapsed`](Self::elapsed).
    pub fn stop(&self) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if let RunClock::Running(start) = &*clock {
            *clock = RunClock::Stopped(start.elapsed());
        }
    }

    /// Returns the time elapsed since [`start`](Self::start), up to [`stop`](Self::stop).
    pub fn elapsed(&self) -> Duration {
        match &*self.clock.lock().unwrap_or_else(PoisonError::into_inner) {
            RunClock::NotStarted => Duration::ZERO,
            RunClock::Running(start) => start.elapsed(),
            RunClock::Stopped(elapsed) => *elapsed,
        }
    }

    /// Records a failed attempt of `test_case` in `pool`. Returns the new failure count.
    pub fn record_failed_test_case(&self, pool: &PoolName, test_case: &TestIdentifier) -> usize {
        self.accumulator.record(pool, test_case)
    }

    /// Decides whether `test_case` may be retried in `pool`, based on the failures recorded so
    /// far. An admitted retry consumes one unit of the run-wide budget.
    pub fn request_retry(&self, pool: &PoolName, test_case: &TestIdentifier) -> RetryDecision {
        let failures = self.accumulator.count(pool, test_case);
        self.watchdog.request_retry(failures)
    }

    /// Returns the failures recorded for `test_case` in `pool`.
    pub fn failure_count(&self, pool: &PoolName, test_case: &TestIdentifier) -> usize {
        self.accumulator.count(pool, test_case)
    }

    /// Returns the failures recorded across the whole run.
    pub fn total_failures(&self) -> usize {
        self.accumulator.total()
    }

    /// Returns the number of retries admitted so far.
    pub fn retries_used(&self) -> usize {
        self.watchdog.retries_used()
    }

    /// Updates the pool's tracker with a final (non-retried) result and logs progress.
    pub fn on_final_result(&self, result: &TestCaseRunResult) {
        let Some(tracker) = self.pools.get(&result.pool) else {
            warn!("[{}] result for unknown pool: {}", result.pool, result.test_case);
            return;
        };
        let progress = tracker.on_final_result(result.status.is_failure());
        info!(
            "[{}] {}/{} ({:.0}%) {} {} on {}",
            result.pool,
            progress.completed,
            progress.scheduled,
            progress.fraction() * 100.0,
            result.status,
            result.test_case,
            result.device_name(),
        );
    }

    /// Returns the progress of `pool`, if it is known.
    pub fn pool_progress(&self, pool: &PoolName) -> Option<PoolProgress> {
        self.pools.get(pool).map(PoolProgressTracker::snapshot)
    }

    /// Returns the fraction of all scheduled test cases, over all pools, that are complete.
    pub fn progress(&self) -> f64 {
        let (completed, scheduled) = self
            .pools
            .values()
            .map(PoolProgressTracker::snapshot)
            .fold((0, 0), |(completed, scheduled), progress| {
                (completed + progress.completed, scheduled + progress.scheduled)
            });
        if scheduled == 0 {
            1.0
        } else {
            completed as f64 / scheduled as f64
        }
    }
}

#[derive(Debug)]
enum RunClock {
    NotStarted,
    Running(StopwatchStart),
    Stopped(Duration),
}
