// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestCaseRunResult;
use crate::errors::WriteReportError;
use std::sync::{Mutex, PoisonError};

/// Accepts results as workers produce them.
///
/// Sinks are called concurrently from every worker thread. An error returned by a sink is logged
/// and otherwise ignored: it never affects scheduling.
pub trait ResultSink: Send + Sync {
    /// Records the final result for a test case in a pool.
    fn record(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError>;

    /// Records a failed attempt that was retried.
    fn record_retried(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        let _ = result;
        Ok(())
    }
}

/// Results recorded over the course of a run.
#[derive(Clone, Debug, Default)]
pub struct RecordedResults {
    /// Final results, in the order they were recorded.
    pub finals: Vec<TestCaseRunResult>,

    /// Failed attempts that were retried, in the order they were recorded.
    pub retried: Vec<TestCaseRunResult>,
}

impl RecordedResults {
    /// Returns the total number of recorded attempts.
    pub fn attempt_count(&self) -> usize {
        self.finals.len() + self.retried.len()
    }
}

/// A concurrent, append-only collection of results.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<RecordedResults>,
}

impl ResultCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn snapshot(&self) -> RecordedResults {
        self.lock().clone()
    }

    /// Consumes the collector, returning everything recorded.
    pub fn into_results(self) -> RecordedResults {
        self.results
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordedResults> {
        // Every push leaves the lists consistent, so a poisoned lock is still usable.
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultSink for ResultCollector {
    fn record(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        self.lock().finals.push(result.clone());
        Ok(())
    }

    fn record_retried(&self, result: &TestCaseRunResult) -> Result<(), WriteReportError> {
        self.lock().retried.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::DeviceId,
        pool::PoolName,
        reporter::TestStatus,
        test_case::TestIdentifier,
    };
    use chrono::Local;
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    fn result(method: &str, status: TestStatus) -> TestCaseRunResult {
        TestCaseRunResult {
            pool: PoolName::new("default"),
            device: Some(DeviceId::new("emulator-5554")),
            test_case: TestIdentifier::new("com.example.A", method),
            status,
            trace: None,
            attempt: 1,
            start_time: Local::now(),
            time_taken: Duration::from_millis(5),
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let collector = Arc::new(ResultCollector::new());
        std::thread::scope(|s| {
            for thread in 0..8 {
                let collector = collector.clone();
                s.spawn(move || {
                    for i in 0..50 {
                        let method = format!("t{thread}_{i}");
                        collector
                            .record_retried(&result(&method, TestStatus::Fail))
                            .unwrap();
                        collector.record(&result(&method, TestStatus::Pass)).unwrap();
                    }
                });
            }
        });

        let results = Arc::into_inner(collector)
            .expect("all threads joined")
            .into_results();
        assert_eq!(results.finals.len(), 400);
        assert_eq!(results.retried.len(), 400);
        assert_eq!(results.attempt_count(), 800);
    }
}
