// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolSummary, Summary, TestCaseRunResult, TestStatus};
use crate::errors::WriteReportError;
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestRerun, TestSuite};
use std::fs::File;
use tracing::debug;

/// Writes a JUnit XML report for a compiled [`Summary`].
///
/// Each pool becomes a test suite. Retried attempts are recorded as reruns of the final result, so
/// a test that passed after a retry shows up as flaky.
#[derive(Clone, Debug)]
pub struct JunitSink {
    path: Utf8PathBuf,
    report_name: String,
}

impl JunitSink {
    /// The default report name.
    pub const DEFAULT_REPORT_NAME: &'static str = "tongs-run";

    /// Creates a sink that writes to `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            report_name: Self::DEFAULT_REPORT_NAME.to_owned(),
        }
    }

    /// Sets the name of the report.
    pub fn with_report_name(mut self, name: impl Into<String>) -> Self {
        self.report_name = name.into();
        self
    }

    /// Returns the path the report is written to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Builds the report for `summary` and writes it out.
    pub fn write(&self, summary: &Summary) -> Result<(), WriteReportError> {
        let report = self.build_report(summary);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| WriteReportError::Io {
                path: parent.to_owned(),
                err,
            })?;
        }
        let f = File::create(&self.path).map_err(|err| WriteReportError::Io {
            path: self.path.clone(),
            err,
        })?;
        report.serialize(f).map_err(|err| WriteReportError::Junit {
            path: self.path.clone(),
            err,
        })?;

        debug!("wrote JUnit report to {}", self.path);
        Ok(())
    }

    fn build_report(&self, summary: &Summary) -> Report {
        let mut report = Report::new(self.report_name.as_str());
        report
            .set_timestamp(summary.start_time())
            .set_time(summary.elapsed())
            .add_test_suites(summary.pools().map(pool_suite));
        report
    }
}

fn pool_suite(pool: &PoolSummary) -> TestSuite {
    let mut suite = TestSuite::new(pool.name().as_str());
    let devices = pool.devices().iter().map(|id| id.as_str()).join(",");
    suite.add_property(("devices", devices.as_str()));

    for result in pool.final_results().chain(pool.fatal_crashes()) {
        let mut status = match result.status {
            TestStatus::Pass => TestCaseStatus::success(),
            TestStatus::Ignored | TestStatus::AssumptionFailed => {
                let mut status = TestCaseStatus::skipped();
                status.set_type(result.status.as_str());
                status
            }
            TestStatus::Fail | TestStatus::Error => {
                let mut status = TestCaseStatus::non_success(non_success_kind(result.status));
                status.set_type(result.status.as_str());
                status
            }
        };
        if let Some(trace) = &result.trace {
            status.set_description(trace.as_str());
        }

        if !result.status.is_ignored() {
            for rerun in pool
                .retried()
                .iter()
                .filter(|rerun| rerun.test_case == result.test_case)
            {
                status.add_rerun(test_rerun(rerun));
            }
        }

        let mut testcase = TestCase::new(result.test_case.method(), status);
        testcase
            .set_classname(result.test_case.class())
            .set_timestamp(result.start_time)
            .set_time(result.time_taken);
        suite.add_test_case(testcase);
    }

    suite
}

fn test_rerun(result: &TestCaseRunResult) -> TestRerun {
    let mut rerun = TestRerun::new(non_success_kind(result.status));
    rerun
        .set_timestamp(result.start_time)
        .set_time(result.time_taken)
        .set_type(format!("{} on {}", result.status, result.device_name()));
    if let Some(trace) = &result.trace {
        rerun.set_description(trace.as_str());
    }
    rerun
}

fn non_success_kind(status: TestStatus) -> NonSuccessKind {
    match status {
        TestStatus::Error => NonSuccessKind::Error,
        _ => NonSuccessKind::Failure,
    }
}
