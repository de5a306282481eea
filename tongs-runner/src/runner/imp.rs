// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{attempt::panic_message, pool::PoolTestRunner};
use crate::{
    config::{RetryQuota, TongsConfig},
    errors::{DisplayErrorChain, RunSetupError, WriteReportError},
    executor::TestExecutor,
    pool::Pool,
    progress::OverallProgressReporter,
    reporter::{
        RecordedResults, ResultCollector, ResultSink, Summary, SummaryCompiler, TestCaseRunResult,
    },
    test_case::TestSuite,
    time::stopwatch,
};
use debug_ignore::DebugIgnore;
use rayon::ThreadPoolBuilder;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::{info, warn};

/// Scheduling settings for a run.
#[derive(Clone, Debug)]
pub struct RunnerSettings {
    retry_quota: RetryQuota,
    poll_timeout: Duration,
    test_output_timeout: Duration,
    listener_settle_timeout: Duration,
    retry_on_other_device: bool,
}

impl RunnerSettings {
    /// Creates settings from the `[run]` section of a config.
    pub fn from_config(config: &TongsConfig) -> Self {
        let run = config.run();
        Self {
            retry_quota: config.retry_quota(),
            poll_timeout: run.poll_timeout(),
            test_output_timeout: run.test_output_timeout(),
            listener_settle_timeout: run.listener_settle_timeout(),
            retry_on_other_device: run.retry_on_other_device(),
        }
    }

    /// Sets the retry quota.
    pub fn set_retry_quota(&mut self, retry_quota: RetryQuota) -> &mut Self {
        self.retry_quota = retry_quota;
        self
    }

    /// Sets how long an idle device waits for work before re-checking whether it can stop.
    pub fn set_poll_timeout(&mut self, poll_timeout: Duration) -> &mut Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Sets the output timeout handed to the executor.
    pub fn set_test_output_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.test_output_timeout = timeout;
        self
    }

    /// Sets the extra time to wait for an attempt's result on top of the output timeout.
    pub fn set_listener_settle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.listener_settle_timeout = timeout;
        self
    }

    /// Sets whether retries avoid the device the test case just failed on.
    pub fn set_retry_on_other_device(&mut self, retry_on_other_device: bool) -> &mut Self {
        self.retry_on_other_device = retry_on_other_device;
        self
    }

    /// Returns the retry quota.
    pub fn retry_quota(&self) -> RetryQuota {
        self.retry_quota
    }

    /// Returns the poll timeout.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Returns the output timeout handed to the executor.
    pub fn test_output_timeout(&self) -> Duration {
        self.test_output_timeout
    }

    /// Returns the settle timeout.
    pub fn listener_settle_timeout(&self) -> Duration {
        self.listener_settle_timeout
    }

    /// Returns whether retries avoid the device the test case just failed on.
    pub fn retry_on_other_device(&self) -> bool {
        self.retry_on_other_device
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            retry_quota: RetryQuota::default(),
            poll_timeout: Duration::from_secs(10),
            test_output_timeout: Duration::from_secs(60),
            listener_settle_timeout: Duration::from_secs(15),
            retry_on_other_device: false,
        }
    }
}

/// Runs a test suite in every pool concurrently, then compiles a [`Summary`].
#[derive(Debug)]
pub struct TongsRunner {
    pools: Vec<Pool>,
    suite: TestSuite,
    executor: DebugIgnore<Arc<dyn TestExecutor>>,
    sinks: DebugIgnore<Vec<Arc<dyn ResultSink>>>,
    settings: RunnerSettings,
}

impl TongsRunner {
    /// Creates a new runner.
    ///
    /// Fails if there are no pools or no test cases.
    pub fn new(
        pools: Vec<Pool>,
        suite: TestSuite,
        executor: Arc<dyn TestExecutor>,
        settings: RunnerSettings,
    ) -> Result<Self, RunSetupError> {
        if pools.is_empty() {
            return Err(RunSetupError::NoPools);
        }
        if suite.is_empty() {
            return Err(RunSetupError::NoTestCases);
        }
        Ok(Self {
            pools,
            suite,
            executor: DebugIgnore(executor),
            sinks: DebugIgnore(Vec::new()),
            settings,
        })
    }

    /// Adds a sink that receives results as they are produced.
    pub fn add_sink(&mut self, sink: Arc<dyn ResultSink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the pools.
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Returns the test suite.
    pub fn suite(&self) -> &TestSuite {
        &self.suite
    }

    /// Returns the settings.
    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Runs the suite in every pool and blocks until all of them are done.
    ///
    /// Thread pools are set up before any test runs, so on error no pool has started.
    pub fn run(&self) -> Result<Summary, RunSetupError> {
        let pool_runners = self
            .pools
            .iter()
            .map(PoolTestRunner::new)
            .collect::<Result<Vec<_>, _>>()?;
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(self.pools.len())
            .thread_name(|idx| format!("tongs-pool-{idx}"))
            .build()
            .map_err(|err| RunSetupError::ThreadPoolBuild {
                name: "pools".to_owned(),
                err,
            })?;

        let progress = OverallProgressReporter::new(
            self.settings.retry_quota,
            self.pools
                .iter()
                .map(|pool| (pool.name().clone(), self.suite.len())),
        );
        let ctx = RunContext {
            executor: &self.executor,
            progress: &progress,
            sinks: ResultSinks::new(&self.sinks),
            settings: &self.settings,
        };

        info!(
            "running {} tests in {} pools ({} retries per test, {} in total)",
            self.suite.len(),
            self.pools.len(),
            self.settings.retry_quota.per_test_case,
            self.settings.retry_quota.total,
        );
        let stopwatch = stopwatch();
        progress.start();

        let remaining = AtomicUsize::new(pool_runners.len());
        // The scope returns once every pool has finished, including all of its retries.
        thread_pool.scope(|s| {
            for runner in &pool_runners {
                let ctx = &ctx;
                let remaining = &remaining;
                let suite = &self.suite;
                s.spawn(move |_| {
                    runner.run(suite, ctx);
                    let left = remaining.fetch_sub(1, Ordering::AcqRel) - 1;
                    info!("{left} pools remaining");
                });
            }
        });

        progress.stop();
        let elapsed = progress.elapsed();
        let results = ctx.sinks.into_results();
        let summary = SummaryCompiler::new(&self.pools, &self.suite).compile(
            results,
            stopwatch.snapshot().start_time,
            elapsed,
        );

        info!(
            "run finished in {:.3}s: {} attempts, {} retries, {} failures",
            elapsed.as_secs_f64(),
            summary.total_attempts(),
            progress.retries_used(),
            progress.total_failures(),
        );
        Ok(summary)
    }
}

/// State shared by every worker in a run.
pub(super) struct RunContext<'a> {
    pub(super) executor: &'a Arc<dyn TestExecutor>,
    pub(super) progress: &'a OverallProgressReporter,
    pub(super) sinks: ResultSinks<'a>,
    pub(super) settings: &'a RunnerSettings,
}

impl RunContext<'_> {
    /// Records the final result for a test case in a pool.
    pub(super) fn record_final(&self, result: &TestCaseRunResult) {
        self.sinks.record_final(result);
        self.progress.on_final_result(result);
    }

    /// Records an attempt that was retried.
    pub(super) fn record_retried(&self, result: &TestCaseRunResult) {
        self.sinks.record_retried(result);
    }
}

/// The collector every run records into, plus any sinks added by the caller.
pub(super) struct ResultSinks<'a> {
    collector: ResultCollector,
    extra: &'a [Arc<dyn ResultSink>],
}

impl<'a> ResultSinks<'a> {
    fn new(extra: &'a [Arc<dyn ResultSink>]) -> Self {
        Self {
            collector: ResultCollector::new(),
            extra,
        }
    }

    fn sinks(&self) -> impl Iterator<Item = &dyn ResultSink> + '_ {
        std::iter::once(&self.collector as &dyn ResultSink)
            .chain(self.extra.iter().map(|sink| &**sink))
    }

    fn record_final(&self, result: &TestCaseRunResult) {
        self.record_each(result, "result for", |sink| sink.record(result));
    }

    fn record_retried(&self, result: &TestCaseRunResult) {
        self.record_each(result, "retried attempt of", |sink| {
            sink.record_retried(result)
        });
    }

    /// Hands `result` to every sink. Neither an error nor a panic in one sink stops the others,
    /// and neither reaches the worker.
    fn record_each(
        &self,
        result: &TestCaseRunResult,
        what: &str,
        record: impl Fn(&dyn ResultSink) -> Result<(), WriteReportError>,
    ) {
        for sink in self.sinks() {
            match panic::catch_unwind(AssertUnwindSafe(|| record(sink))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    "[{}] failed to record {what} {}: {}",
                    result.pool,
                    result.test_case,
                    DisplayErrorChain::new(err),
                ),
                Err(panic) => warn!(
                    "[{}] result sink panicked while recording {what} {}: {}",
                    result.pool,
                    result.test_case,
                    panic_message(&*panic),
                ),
            }
        }
    }

    fn into_results(self) -> RecordedResults {
        self.collector.into_results()
    }
}
