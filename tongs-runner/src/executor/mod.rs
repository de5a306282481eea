// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract between the scheduler and whatever actually runs a test on a device.
//!
//! An executor receives an [`ExecutionRequest`] and reports the lifecycle of the attempt as a
//! stream of [`TestOutcome`] values. A fatal, run-level failure is returned as an
//! [`ExecutionError`]; the scheduler turns it into an `ERROR` result.

mod command;

pub use command::*;

use crate::{
    device::Device, errors::ExecutionError, pool::PoolName, test_case::TestCaseEvent,
};
use crossbeam_channel::Sender;
use std::{collections::BTreeMap, time::Duration};

/// Runs a single attempt of a test case on a device.
///
/// Implementations must respect [`ExecutionRequest::output_timeout`]: if the test stops
/// producing output for that long, the attempt should be abandoned with an error. The scheduler
/// additionally bounds how long it waits for the attempt, but cannot cancel it.
pub trait TestExecutor: Send + Sync {
    /// Executes the request, reporting lifecycle events through `outcomes`.
    fn execute(
        &self,
        request: &ExecutionRequest,
        outcomes: &OutcomeSender,
    ) -> Result<(), ExecutionError>;
}

/// Everything an executor needs to run one attempt.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    /// The pool the attempt belongs to.
    pub pool: PoolName,

    /// The device to run on.
    pub device: Device,

    /// The test case to run.
    pub test_case: TestCaseEvent,

    /// The attempt number, starting at 1.
    pub attempt: usize,

    /// The longest time the test may go without producing output.
    pub output_timeout: Duration,
}

/// A lifecycle event reported by an executor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestOutcome {
    /// The test started running.
    Started,

    /// The test failed with the given trace.
    Failed {
        /// The failure trace.
        trace: String,
    },

    /// An assumption in the test did not hold.
    AssumptionFailed {
        /// The assumption trace.
        trace: String,
    },

    /// The test was ignored by the test framework.
    Ignored,

    /// The test finished. A test that ends without a prior failure passed.
    Ended {
        /// Metrics reported by the test run.
        metrics: BTreeMap<String, String>,
    },
}

#[derive(Debug)]
pub(crate) enum AttemptMessage {
    Outcome(TestOutcome),
    Finished(Result<(), ExecutionError>),
}

/// Reports [`TestOutcome`]s for an attempt back to the worker that requested it.
#[derive(Clone, Debug)]
pub struct OutcomeSender {
    sender: Sender<AttemptMessage>,
}

impl OutcomeSender {
    pub(crate) fn new(sender: Sender<AttemptMessage>) -> Self {
        Self { sender }
    }

    /// Reports an outcome.
    ///
    /// If the worker has stopped waiting for this attempt, the outcome is discarded.
    pub fn send(&self, outcome: TestOutcome) {
        // Failure to send means the worker gave up on this attempt.
        let _ = self.sender.send(AttemptMessage::Outcome(outcome));
    }

    /// Reports that the test started.
    pub fn started(&self) {
        self.send(TestOutcome::Started);
    }

    /// Reports that the test failed.
    pub fn failed(&self, trace: impl Into<String>) {
        self.send(TestOutcome::Failed {
            trace: trace.into(),
        });
    }

    /// Reports that an assumption in the test did not hold.
    pub fn assumption_failed(&self, trace: impl Into<String>) {
        self.send(TestOutcome::AssumptionFailed {
            trace: trace.into(),
        });
    }

    /// Reports that the test was ignored.
    pub fn ignored(&self) {
        self.send(TestOutcome::Ignored);
    }

    /// Reports that the test ended.
    pub fn ended(&self, metrics: BTreeMap<String, String>) {
        self.send(TestOutcome::Ended { metrics });
    }
}
