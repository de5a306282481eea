// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RecordedResults, TestCaseRunResult};
use crate::{
    device::DeviceId,
    errors::WriteReportError,
    pool::{Pool, PoolName},
    test_case::{TestIdentifier, TestSuite},
};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::{collections::HashSet, time::Duration};
use tongs_metadata::{PoolSummarySerialized, RunSummarySerialized, TestResultSerialized};
use tracing::{error, warn};

/// Reconciles recorded results against the test cases that were scheduled.
///
/// A test case scheduled for a pool without a final result in that pool is a fatal crash: it is
/// synthesized as an `ERROR` result with no device.
#[derive(Clone, Copy, Debug)]
pub struct SummaryCompiler<'a> {
    pools: &'a [Pool],
    suite: &'a TestSuite,
}

impl<'a> SummaryCompiler<'a> {
    /// Creates a compiler for a run of `suite` in every pool in `pools`.
    pub fn new(pools: &'a [Pool], suite: &'a TestSuite) -> Self {
        Self { pools, suite }
    }

    /// Compiles the summary. Must only be called once every pool has finished.
    pub fn compile(
        &self,
        results: RecordedResults,
        start_time: DateTime<Local>,
        elapsed: Duration,
    ) -> Summary {
        let mut pools: IndexMap<PoolName, PoolSummary> = self
            .pools
            .iter()
            .map(|pool| (pool.name().clone(), PoolSummary::new(pool)))
            .collect();

        for result in results.finals {
            match pools.get_mut(&result.pool) {
                Some(summary) => summary.add_final(result),
                None => warn!(
                    "discarding result for {} from unknown pool `{}`",
                    result.test_case, result.pool,
                ),
            }
        }
        for result in results.retried {
            match pools.get_mut(&result.pool) {
                Some(summary) => summary.retried.push(result),
                None => warn!(
                    "discarding retried attempt of {} from unknown pool `{}`",
                    result.test_case, result.pool,
                ),
            }
        }

        for (name, summary) in &mut pools {
            let seen: HashSet<&TestIdentifier> = summary
                .final_results()
                .map(|result| &result.test_case)
                .collect();
            let crashed: Vec<_> = self
                .suite
                .iter()
                .filter(|event| !seen.contains(event.id()))
                .map(|event| TestCaseRunResult::fatal_crash(name.clone(), event.id().clone()))
                .collect();
            for result in &crashed {
                error!("[{name}] fatal crash: {} never produced a result", result.test_case);
            }
            summary.fatal_crashes = crashed;
        }

        Summary {
            start_time,
            elapsed,
            pools,
        }
    }
}

/// Decides whether a run as a whole succeeded.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutcomeAggregator;

impl OutcomeAggregator {
    /// Returns true if no test crashed fatally and no final result is a failure.
    ///
    /// A run with only passed and ignored results is successful.
    pub fn aggregate(summary: &Summary) -> bool {
        summary.fatal_crashes().next().is_none() && summary.failed().next().is_none()
    }
}

/// The compiled results of a run.
#[derive(Clone, Debug)]
pub struct Summary {
    start_time: DateTime<Local>,
    elapsed: Duration,
    pools: IndexMap<PoolName, PoolSummary>,
}

impl Summary {
    /// Returns when the run started.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Returns how long the run took.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns the per-pool summaries, in pool order.
    pub fn pools(&self) -> impl ExactSizeIterator<Item = &PoolSummary> + '_ {
        self.pools.values()
    }

    /// Returns the summary for a pool.
    pub fn pool(&self, name: &PoolName) -> Option<&PoolSummary> {
        self.pools.get(name)
    }

    /// Returns every final result that is a failure, across all pools.
    pub fn failed(&self) -> impl Iterator<Item = &TestCaseRunResult> + '_ {
        self.pools.values().flat_map(|pool| pool.failed.iter())
    }

    /// Returns every ignored final result, across all pools.
    pub fn ignored(&self) -> impl Iterator<Item = &TestCaseRunResult> + '_ {
        self.pools.values().flat_map(|pool| pool.ignored.iter())
    }

    /// Returns every fatal crash, across all pools.
    pub fn fatal_crashes(&self) -> impl Iterator<Item = &TestCaseRunResult> + '_ {
        self.pools.values().flat_map(|pool| pool.fatal_crashes.iter())
    }

    /// Returns the total number of execution attempts, including retried attempts.
    pub fn total_attempts(&self) -> usize {
        self.pools.values().map(PoolSummary::total_attempts).sum()
    }

    /// Returns the number of passed final results, across all pools.
    pub fn passed_count(&self) -> usize {
        self.pools.values().map(|pool| pool.passed.len()).sum()
    }

    /// Returns the number of tests that passed after a retried failure, across all pools.
    pub fn flaky_count(&self) -> usize {
        self.pools.values().map(|pool| pool.flaky().count()).sum()
    }

    /// Returns true if the run succeeded. See [`OutcomeAggregator::aggregate`].
    pub fn is_success(&self) -> bool {
        OutcomeAggregator::aggregate(self)
    }

    /// Converts this summary into its serializable form.
    pub fn to_serialized(&self) -> RunSummarySerialized {
        RunSummarySerialized {
            success: self.is_success(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            total_attempts: self.total_attempts(),
            pools: self
                .pools
                .iter()
                .map(|(name, pool)| (name.to_string(), pool.to_serialized()))
                .collect(),
            fatal_crashes: self
                .pools
                .values()
                .flat_map(|pool| {
                    pool.fatal_crashes.iter().map(|result| {
                        serialize_result(result, pool.failure_count(&result.test_case))
                    })
                })
                .collect(),
        }
    }

    /// Writes the JSON summary to `path`, creating parent directories as needed.
    pub fn write_json(&self, path: &Utf8Path) -> Result<(), WriteReportError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| WriteReportError::Io {
                path: parent.to_owned(),
                err,
            })?;
        }
        let f = std::fs::File::create(path).map_err(|err| WriteReportError::Io {
            path: path.to_owned(),
            err,
        })?;
        serde_json::to_writer_pretty(f, &self.to_serialized()).map_err(|err| {
            WriteReportError::Json {
                path: path.to_owned(),
                err,
            }
        })
    }
}

/// The compiled results of a single pool.
#[derive(Clone, Debug)]
pub struct PoolSummary {
    name: PoolName,
    devices: Vec<DeviceId>,
    passed: Vec<TestCaseRunResult>,
    failed: Vec<TestCaseRunResult>,
    ignored: Vec<TestCaseRunResult>,
    retried: Vec<TestCaseRunResult>,
    fatal_crashes: Vec<TestCaseRunResult>,
}

impl PoolSummary {
    fn new(pool: &Pool) -> Self {
        Self {
            name: pool.name().clone(),
            devices: pool.device_ids().cloned().collect(),
            passed: Vec::new(),
            failed: Vec::new(),
            ignored: Vec::new(),
            retried: Vec::new(),
            fatal_crashes: Vec::new(),
        }
    }

    fn add_final(&mut self, result: TestCaseRunResult) {
        if result.status.is_failure() {
            self.failed.push(result);
        } else if result.status.is_ignored() {
            self.ignored.push(result);
        } else {
            self.passed.push(result);
        }
    }

    /// Returns the pool's name.
    pub fn name(&self) -> &PoolName {
        &self.name
    }

    /// Returns the devices in the pool.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Returns the final results that passed.
    pub fn passed(&self) -> &[TestCaseRunResult] {
        &self.passed
    }

    /// Returns the final results that failed.
    pub fn failed(&self) -> &[TestCaseRunResult] {
        &self.failed
    }

    /// Returns the final results that were ignored or had a failed assumption.
    pub fn ignored(&self) -> &[TestCaseRunResult] {
        &self.ignored
    }

    /// Returns the failed attempts that were retried.
    pub fn retried(&self) -> &[TestCaseRunResult] {
        &self.retried
    }

    /// Returns the synthesized results for tests that never produced a result.
    pub fn fatal_crashes(&self) -> &[TestCaseRunResult] {
        &self.fatal_crashes
    }

    /// Returns the final results recorded for the pool, excluding fatal crashes.
    pub fn final_results(&self) -> impl Iterator<Item = &TestCaseRunResult> + '_ {
        self.passed
            .iter()
            .chain(self.failed.iter())
            .chain(self.ignored.iter())
    }

    /// Returns the passed results of tests that failed at least once before passing.
    pub fn flaky(&self) -> impl Iterator<Item = &TestCaseRunResult> + '_ {
        let retried: HashSet<&TestIdentifier> =
            self.retried.iter().map(|result| &result.test_case).collect();
        self.passed
            .iter()
            .filter(move |result| retried.contains(&result.test_case))
    }

    /// Returns the number of failed attempts of `test_case` in this pool.
    pub fn failure_count(&self, test_case: &TestIdentifier) -> usize {
        self.retried
            .iter()
            .chain(self.failed.iter())
            .filter(|result| &result.test_case == test_case)
            .count()
    }

    /// Returns the number of execution attempts in this pool, including retried attempts.
    pub fn total_attempts(&self) -> usize {
        self.passed.len() + self.failed.len() + self.ignored.len() + self.retried.len()
    }

    fn to_serialized(&self) -> PoolSummarySerialized {
        let serialize_all = |results: &[TestCaseRunResult]| {
            results
                .iter()
                .map(|result| serialize_result(result, self.failure_count(&result.test_case)))
                .collect()
        };
        PoolSummarySerialized {
            devices: self.devices.iter().map(|id| id.to_string()).collect(),
            passed: self.passed.len(),
            flaky: self.flaky().count(),
            failed: serialize_all(&self.failed),
            ignored: serialize_all(&self.ignored),
        }
    }
}

fn serialize_result(result: &TestCaseRunResult, failure_count: usize) -> TestResultSerialized {
    TestResultSerialized {
        class: result.test_case.class().to_owned(),
        method: result.test_case.method().to_owned(),
        device: result.device.as_ref().map(|id| id.to_string()),
        status: result.status.as_str().to_owned(),
        failure_count,
        trace: result.trace.clone(),
    }
}
