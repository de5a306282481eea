// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tongs_metadata::RunSummarySerialized;
use tongs_runner::{
    config::RetryQuota,
    device::DeviceId,
    errors::{RunSetupError, WriteReportError},
    pool::PoolName,
    reporter::{JunitSink, ResultSink, TestCaseRunResult, TestStatus},
    runner::TongsRunner,
    test_case::{TestCaseEvent, TestSuite},
};

#[test]
fn flaky_test_is_retried_once_and_passes() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("first", FixtureStatus::Pass),
        ("second", FixtureStatus::Flaky { pass_attempt: 2 }),
        ("third", FixtureStatus::Pass),
    ]));
    let suite = executor.suite(&["first", "second", "third"]);
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::new(1, 1));

    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        suite,
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    assert_eq!(executor.attempts().len(), 4, "3 first attempts + 1 retry");
    assert_eq!(summary.total_attempts(), 4);
    assert_eq!(summary.passed_count(), 3);
    assert_eq!(summary.failed().count(), 0);
    assert_eq!(summary.fatal_crashes().count(), 0);
    assert_eq!(summary.flaky_count(), 1);
    assert!(summary.is_success());

    let second: Vec<_> = executor
        .attempts_of("second")
        .into_iter()
        .map(|attempt| attempt.attempt)
        .collect();
    assert_eq!(second, [1, 2]);
    Ok(())
}

#[test]
fn ignored_and_assumption_failures_are_not_failures() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("passes", FixtureStatus::Pass),
        ("ignored", FixtureStatus::Ignored),
        ("assumes", FixtureStatus::AssumptionFailure),
    ]));
    let suite = executor.suite(&["passes", "ignored", "assumes"]);
    let runner = TongsRunner::new(
        vec![pool("default", &["d1"])],
        suite,
        executor_arc(&executor),
        fast_settings(),
    )?;
    let summary = runner.run()?;

    ensure!(
        executor.attempts_of("ignored").is_empty(),
        "ignored test was not executed"
    );
    let mut ignored: Vec<_> = summary
        .ignored()
        .map(|result| (result.test_case.method().to_owned(), result.status))
        .collect();
    ignored.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        ignored,
        [
            ("assumes".to_owned(), TestStatus::AssumptionFailed),
            ("ignored".to_owned(), TestStatus::Ignored),
        ]
    );
    assert!(summary.is_success());
    Ok(())
}

#[test]
fn every_pool_runs_the_whole_suite() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("a", FixtureStatus::Pass),
        ("b", FixtureStatus::FailOn("x1")),
    ]));
    let suite = executor.suite(&["a", "b"]);
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::new(1, 10));

    let runner = TongsRunner::new(
        vec![pool("x", &["x1"]), pool("y", &["y1", "y2"])],
        suite,
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    let x = summary.pool(&PoolName::new("x")).expect("pool x exists");
    let y = summary.pool(&PoolName::new("y")).expect("pool y exists");
    assert_eq!(x.passed().len(), 1);
    assert_eq!(x.failed().len(), 1);
    assert_eq!(x.failure_count(&id("b")), 2, "x1 failed b twice");
    assert_eq!(y.passed().len(), 2);
    assert_eq!(y.failure_count(&id("b")), 0, "failures are counted per pool");
    for result in y.passed() {
        let device = result.device.as_ref().expect("result has a device");
        ensure!(
            device.as_str().starts_with('y'),
            "pool y ran on its own devices"
        );
    }
    assert!(!summary.is_success());
    Ok(())
}

#[test]
fn hung_test_becomes_an_error() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("hangs", FixtureStatus::Hang),
        ("passes", FixtureStatus::Pass),
    ]));
    let suite = executor.suite(&["hangs", "passes"]);
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::NONE);

    let start = Instant::now();
    let runner = TongsRunner::new(
        vec![pool("default", &["d1"])],
        suite,
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    ensure!(
        start.elapsed() < Duration::from_secs(4),
        "run did not wait for the hung test"
    );
    let failed: Vec<_> = summary.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].test_case, id("hangs"));
    assert_eq!(failed[0].status, TestStatus::Error);
    assert_eq!(summary.fatal_crashes().count(), 0, "a hang still produces a result");
    assert_eq!(summary.passed_count(), 1);
    Ok(())
}

#[test]
fn test_excluded_from_every_device_is_an_error() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([("a", FixtureStatus::Pass)]));
    let excluded = TestCaseEvent::with_metadata(
        id("excluded"),
        false,
        BTreeMap::new(),
        Vec::new(),
        [DeviceId::new("d1"), DeviceId::new("d2")],
    );
    let suite = TestSuite::new([TestCaseEvent::new(id("a")), excluded]);

    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        suite,
        executor_arc(&executor),
        fast_settings(),
    )?;
    let summary = runner.run()?;

    ensure!(
        executor.attempts_of("excluded").is_empty(),
        "excluded test was never executed"
    );
    let failed: Vec<_> = summary.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].test_case, id("excluded"));
    assert_eq!(failed[0].device, None);
    assert_eq!(summary.fatal_crashes().count(), 0);
    assert!(!summary.is_success());
    Ok(())
}

#[test]
fn setup_errors() {
    test_init();

    let executor = Arc::new(FixtureExecutor::default());
    let err = TongsRunner::new(
        vec![pool("default", &["d1"])],
        TestSuite::default(),
        executor_arc(&executor),
        fast_settings(),
    )
    .unwrap_err();
    assert!(matches!(err, RunSetupError::NoTestCases), "{err}");

    let err = TongsRunner::new(
        Vec::new(),
        executor.suite(&["a"]),
        executor_arc(&executor),
        fast_settings(),
    )
    .unwrap_err();
    assert!(matches!(err, RunSetupError::NoPools), "{err}");
}

#[derive(Debug, Default)]
struct BrokenSink {
    calls: AtomicUsize,
}

impl ResultSink for BrokenSink {
    fn record(&self, _result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WriteReportError::Io {
            path: "/nonexistent/report".into(),
            err: std::io::Error::other("disk full"),
        })
    }
}

#[test]
fn failing_sink_does_not_affect_scheduling() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("a", FixtureStatus::Pass),
        ("b", FixtureStatus::Flaky { pass_attempt: 2 }),
        ("c", FixtureStatus::Pass),
    ]));
    let sink = Arc::new(BrokenSink::default());
    let mut runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        executor.suite(&["a", "b", "c"]),
        executor_arc(&executor),
        fast_settings(),
    )?;
    runner.add_sink(sink.clone());
    let summary = runner.run()?;

    assert_eq!(sink.calls.load(Ordering::SeqCst), 3, "sink saw every final result");
    assert_eq!(summary.passed_count(), 3);
    assert!(summary.is_success());
    Ok(())
}

/// A sink that panics on `a`'s final result and on every retried attempt.
struct PanickingSink;

impl ResultSink for PanickingSink {
    fn record(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        if result.test_case.method() == "a" {
            panic!("sink panicked on {}", result.test_case);
        }
        Ok(())
    }

    fn record_retried(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        panic!("sink panicked on retried {}", result.test_case);
    }
}

#[test]
fn panicking_sink_does_not_stall_the_pool() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("a", FixtureStatus::Pass),
        ("b", FixtureStatus::Flaky { pass_attempt: 2 }),
    ]));
    let mut runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        executor.suite(&["a", "b"]),
        executor_arc(&executor),
        fast_settings(),
    )?;
    runner.add_sink(Arc::new(PanickingSink));

    let (sender, receiver) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = sender.send(runner.run());
    });
    let summary = receiver
        .recv_timeout(Duration::from_secs(10))
        .map_err(|_| color_eyre::eyre::eyre!("run did not finish within 10s"))??;

    assert_eq!(summary.passed_count(), 2);
    assert_eq!(summary.fatal_crashes().count(), 0);
    assert_eq!(executor.attempts().len(), 3);
    assert!(summary.is_success());
    Ok(())
}

#[test]
fn reports_are_written() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("a", FixtureStatus::Pass),
        ("b", FixtureStatus::Fail),
    ]));
    let runner = TongsRunner::new(
        vec![pool("default", &["d1"])],
        executor.suite(&["a", "b"]),
        executor_arc(&executor),
        fast_settings(),
    )?;
    let summary = runner.run()?;

    let dir = Utf8TempDir::new()?;
    let junit = JunitSink::new(dir.path().join("reports/junit.xml"));
    junit.write(&summary)?;
    let json_path = dir.path().join("reports/summary.json");
    summary.write_json(&json_path)?;

    let xml = std::fs::read_to_string(junit.path())?;
    ensure!(xml.contains("rerunFailure"), "retried failure recorded: {xml}");

    let json: RunSummarySerialized = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
    assert!(!json.success);
    assert_eq!(json.total_attempts, 3);
    let failed = &json.pools["default"].failed;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].method, "b");
    assert_eq!(failed[0].failure_count, 2);
    Ok(())
}
