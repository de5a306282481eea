// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_case::test_case;
use tongs_runner::{config::RetryQuota, reporter::TestStatus, runner::TongsRunner};

#[test_case(RetryQuota::NONE, 1 ; "no retries")]
#[test_case(RetryQuota::new(1, 20), 2 ; "one retry per test")]
#[test_case(RetryQuota::new(3, 20), 4 ; "three retries per test")]
#[test_case(RetryQuota::new(3, 2), 3 ; "limited by run-wide quota")]
fn failing_test_attempts(quota: RetryQuota, expected_attempts: usize) -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([("fails", FixtureStatus::Fail)]));
    let mut settings = fast_settings();
    settings.set_retry_quota(quota);
    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        executor.suite(&["fails"]),
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    let attempts: Vec<_> = executor
        .attempts_of("fails")
        .into_iter()
        .map(|attempt| attempt.attempt)
        .collect();
    assert_eq!(attempts, (1..=expected_attempts).collect::<Vec<_>>());
    assert_eq!(summary.total_attempts(), expected_attempts);
    assert_eq!(summary.failed().count(), 1);
    assert!(!summary.is_success());
    Ok(())
}

#[test]
fn run_wide_quota_is_shared_between_tests() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([
        ("a", FixtureStatus::Fail),
        ("b", FixtureStatus::Fail),
        ("c", FixtureStatus::Fail),
    ]));
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::new(5, 2));
    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2", "d3"])],
        executor.suite(&["a", "b", "c"]),
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    assert_eq!(executor.attempts().len(), 5, "3 first attempts + 2 retries");
    assert_eq!(summary.failed().count(), 3);
    Ok(())
}

#[test]
fn executor_failure_is_retried_like_a_test_failure() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([("exec", FixtureStatus::ExecFail)]));
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::new(1, 5));
    let runner = TongsRunner::new(
        vec![pool("default", &["d1"])],
        executor.suite(&["exec"]),
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    assert_eq!(executor.attempts_of("exec").len(), 2);
    let failed: Vec<_> = summary.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, TestStatus::Error);
    let trace = failed[0].trace.as_deref().unwrap_or_default();
    ensure!(trace.contains("device disconnected"), "trace: {trace}");
    Ok(())
}

#[test]
fn retry_on_other_device() -> Result<()> {
    test_init();

    let executor = Arc::new(FixtureExecutor::new([("picky", FixtureStatus::FailOn("d1"))]));
    let mut settings = fast_settings();
    settings
        .set_retry_quota(RetryQuota::new(1, 5))
        .set_retry_on_other_device(true);
    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2"])],
        executor.suite(&["picky"]),
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    let last = executor
        .attempts_of("picky")
        .pop()
        .expect("picky ran at least once");
    assert_eq!(last.device, "d2", "a retry never lands on the failing device");
    assert!(summary.is_success());
    Ok(())
}

#[test]
fn many_flaky_tests_on_many_devices() -> Result<()> {
    test_init();

    let methods: Vec<String> = (0..50).map(|i| format!("flaky_{i:02}")).collect();
    let executor = Arc::new(FixtureExecutor::new(
        methods
            .iter()
            .map(|method| (method.as_str(), FixtureStatus::Flaky { pass_attempt: 2 })),
    ));
    let method_refs: Vec<&str> = methods.iter().map(String::as_str).collect();
    let mut settings = fast_settings();
    settings.set_retry_quota(RetryQuota::new(1, 100));
    let runner = TongsRunner::new(
        vec![pool("default", &["d1", "d2", "d3", "d4"])],
        executor.suite(&method_refs),
        executor_arc(&executor),
        settings,
    )?;
    let summary = runner.run()?;

    assert_eq!(executor.attempts().len(), 100);
    assert_eq!(summary.passed_count(), 50);
    assert_eq!(summary.flaky_count(), 50);
    assert_eq!(summary.fatal_crashes().count(), 0);
    assert!(summary.is_success());
    Ok(())
}
