// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outcome records produced by executing test cases.

use crate::{device::DeviceId, pool::PoolName, test_case::TestIdentifier};
use chrono::{DateTime, Local};
use std::{collections::BTreeMap, fmt, time::Duration};

/// The final status of a single attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// The test passed.
    Pass,
    /// The test failed.
    Fail,
    /// The test could not be run to completion: the executor failed, hung or crashed.
    Error,
    /// The test was ignored.
    Ignored,
    /// An assumption in the test did not hold, so the test was skipped at runtime.
    AssumptionFailed,
}

impl TestStatus {
    /// Returns true if this status counts as a failure for retries and the final outcome.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }

    /// Returns true if this status counts as ignored in the summary.
    pub fn is_ignored(self) -> bool {
        matches!(self, Self::Ignored | Self::AssumptionFailed)
    }

    /// Returns the kebab-case name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Ignored => "ignored",
            Self::AssumptionFailed => "assumption-failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome record of one executed attempt of a test case on a specific device.
#[derive(Clone, Debug)]
pub struct TestCaseRunResult {
    /// The pool the attempt ran in.
    pub pool: PoolName,

    /// The device the attempt ran on, or `None` for results synthesized without a device.
    pub device: Option<DeviceId>,

    /// The test case.
    pub test_case: TestIdentifier,

    /// The status of the attempt.
    pub status: TestStatus,

    /// The failure or assumption trace, if any.
    pub trace: Option<String>,

    /// The attempt number, starting at 1.
    pub attempt: usize,

    /// When the attempt started.
    pub start_time: DateTime<Local>,

    /// How long the attempt took.
    pub time_taken: Duration,

    /// Metrics reported by the executor when the test ended.
    pub metrics: BTreeMap<String, String>,
}

impl TestCaseRunResult {
    /// The trace attached to results synthesized for tests that never produced a result.
    pub const FATAL_CRASH_TRACE: &'static str =
        "Test case was scheduled but never produced a result: the device or the test process \
         crashed fatally, or the run hung until it was abandoned.";

    /// Synthesizes the `ERROR` result for a test case that never produced a result in `pool`.
    pub fn fatal_crash(pool: PoolName, test_case: TestIdentifier) -> Self {
        Self {
            pool,
            device: None,
            test_case,
            status: TestStatus::Error,
            trace: Some(Self::FATAL_CRASH_TRACE.to_owned()),
            attempt: 0,
            start_time: Local::now(),
            time_taken: Duration::ZERO,
            metrics: BTreeMap::new(),
        }
    }

    /// Returns the device serial, or a placeholder for results without a device.
    pub fn device_name(&self) -> &str {
        match &self.device {
            Some(device) => device.as_str(),
            None => "(no device)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(TestStatus::Pass, false, false ; "pass")]
    #[test_case(TestStatus::Fail, true, false ; "fail")]
    #[test_case(TestStatus::Error, true, false ; "error")]
    #[test_case(TestStatus::Ignored, false, true ; "ignored")]
    #[test_case(TestStatus::AssumptionFailed, false, true ; "assumption failed")]
    fn status_classification(status: TestStatus, failure: bool, ignored: bool) {
        assert_eq!(status.is_failure(), failure);
        assert_eq!(status.is_ignored(), ignored);
    }

    #[test]
    fn fatal_crash_has_no_device() {
        let result = TestCaseRunResult::fatal_crash(
            PoolName::new("default"),
            TestIdentifier::new("com.example.A", "b"),
        );
        assert_eq!(result.status, TestStatus::Error);
        assert_eq!(result.device_name(), "(no device)");
        assert_eq!(result.trace.as_deref(), Some(TestCaseRunResult::FATAL_CRASH_TRACE));
    }
}
