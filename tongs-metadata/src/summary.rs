// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The JSON summary of a completed run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummarySerialized {
    /// Whether the run as a whole was considered successful.
    pub success: bool,

    /// The total time taken by the run, in milliseconds.
    pub elapsed_ms: u64,

    /// The total number of execution attempts, including attempts that were retried.
    pub total_attempts: usize,

    /// Per-pool summaries, keyed by pool name.
    pub pools: BTreeMap<String, PoolSummarySerialized>,

    /// Tests that were scheduled but never produced a result.
    pub fatal_crashes: Vec<TestResultSerialized>,
}

/// The summary for a single pool.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PoolSummarySerialized {
    /// The serials of the devices in this pool.
    pub devices: Vec<String>,

    /// The number of tests that passed, including flaky tests.
    pub passed: usize,

    /// The number of tests that passed only after one or more retries.
    pub flaky: usize,

    /// The final results of tests that did not pass.
    pub failed: Vec<TestResultSerialized>,

    /// The final results of ignored tests.
    pub ignored: Vec<TestResultSerialized>,
}

/// A single test result as it appears in the JSON summary.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TestResultSerialized {
    /// The test class.
    pub class: String,

    /// The test method.
    pub method: String,

    /// The serial of the device the result was produced on, if any.
    pub device: Option<String>,

    /// The final status, in kebab-case (`pass`, `fail`, `error`, `ignored`,
    /// `assumption-failed`).
    pub status: String,

    /// The number of recorded failures for this test in its pool.
    pub failure_count: usize,

    /// The trace associated with a non-passing result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}
