// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{pool::PoolName, test_case::TestIdentifier};
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Failure counts per (pool, test case), plus a run-wide total.
///
/// Counts only ever increase for the lifetime of a run.
#[derive(Debug, Default)]
pub struct PoolTestCaseAccumulator {
    counts: Mutex<HashMap<(PoolName, TestIdentifier), usize>>,
    total: AtomicUsize,
}

impl PoolTestCaseAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure of `test_case` in `pool`, returning the new count for that pair.
    pub fn record(&self, pool: &PoolName, test_case: &TestIdentifier) -> usize {
        let count = {
            let mut counts = self.lock();
            let count = counts
                .entry((pool.clone(), test_case.clone()))
                .or_default();
            *count += 1;
            *count
        };
        self.total.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Returns the number of failures recorded for `test_case` in `pool`.
    pub fn count(&self, pool: &PoolName, test_case: &TestIdentifier) -> usize {
        self.lock()
            .get(&(pool.clone(), test_case.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of failures recorded across all pools and test cases.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(PoolName, TestIdentifier), usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
