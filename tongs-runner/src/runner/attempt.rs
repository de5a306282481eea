// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::DisplayErrorChain,
    executor::{AttemptMessage, ExecutionRequest, OutcomeSender, TestExecutor, TestOutcome},
    reporter::{TestCaseRunResult, TestStatus},
    time::stopwatch,
};
use crossbeam_channel::RecvTimeoutError;
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Runs a single attempt on its own thread and turns what the executor reports into a result.
///
/// The wait is bounded by the request's output timeout plus `settle_timeout`. If the executor is
/// still running after that, its thread is abandoned and the attempt is an `ERROR`. A panicking
/// executor is also an `ERROR`, so this always produces a result.
pub(super) fn run_attempt(
    executor: &Arc<dyn TestExecutor>,
    request: ExecutionRequest,
    settle_timeout: Duration,
) -> TestCaseRunResult {
    let stopwatch = stopwatch();
    let (sender, receiver) = crossbeam_channel::unbounded();
    let outcomes = OutcomeSender::new(sender.clone());

    let thread_executor = executor.clone();
    let thread_request = request.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("tongs-attempt-{}", request.device.serial()))
        .spawn(move || {
            let result = thread_executor.execute(&thread_request, &outcomes);
            let _ = sender.send(AttemptMessage::Finished(result));
        });

    let mut interpreter = OutcomeInterpreter::default();
    let (status, trace) = match spawned {
        Ok(handle) => {
            let deadline = Instant::now() + request.output_timeout + settle_timeout;
            loop {
                match receiver.recv_deadline(deadline) {
                    Ok(AttemptMessage::Outcome(outcome)) => interpreter.observe(outcome),
                    Ok(AttemptMessage::Finished(Ok(()))) => {
                        let _ = handle.join();
                        break interpreter.finish();
                    }
                    Ok(AttemptMessage::Finished(Err(err))) => {
                        let _ = handle.join();
                        break (
                            TestStatus::Error,
                            Some(DisplayErrorChain::new(err).to_string()),
                        );
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(
                            "[{}] {} produced no result within {:?}, abandoning attempt",
                            request.device.serial(),
                            request.test_case,
                            request.output_timeout + settle_timeout,
                        );
                        break (
                            TestStatus::Error,
                            Some(format!(
                                "test produced no result within {:.3}s and was abandoned",
                                (request.output_timeout + settle_timeout).as_secs_f64(),
                            )),
                        );
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        // The executor thread exited without reporting how it finished.
                        let message = match handle.join() {
                            Err(panic) => panic_message(&*panic),
                            Ok(()) => "executor exited without finishing".to_owned(),
                        };
                        break (
                            TestStatus::Error,
                            Some(format!("test executor panicked: {message}")),
                        );
                    }
                }
            }
        }
        Err(err) => (
            TestStatus::Error,
            Some(format!("failed to spawn attempt thread: {err}")),
        ),
    };

    let snapshot = stopwatch.snapshot();
    debug!(
        "[{}] attempt {} of {} finished with {status}",
        request.device.serial(),
        request.attempt,
        request.test_case,
    );
    TestCaseRunResult {
        pool: request.pool,
        device: Some(request.device.id().clone()),
        test_case: request.test_case.id().clone(),
        status,
        trace,
        attempt: request.attempt,
        start_time: snapshot.start_time,
        time_taken: snapshot.duration,
        metrics: interpreter.metrics,
    }
}

pub(super) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "(non-string panic payload)".to_owned()
    }
}

/// Folds the outcomes of an attempt into a status.
#[derive(Debug, Default)]
struct OutcomeInterpreter {
    status: Option<TestStatus>,
    traces: Vec<String>,
    ended: bool,
    metrics: BTreeMap<String, String>,
}

impl OutcomeInterpreter {
    fn observe(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Started => {}
            TestOutcome::Failed { trace } => {
                self.status = Some(TestStatus::Fail);
                self.traces.push(trace);
            }
            TestOutcome::AssumptionFailed { trace } => {
                if self.status != Some(TestStatus::Fail) {
                    self.status = Some(TestStatus::AssumptionFailed);
                }
                self.traces.push(trace);
            }
            TestOutcome::Ignored => {
                if self.status.is_none() {
                    self.status = Some(TestStatus::Ignored);
                }
            }
            TestOutcome::Ended { metrics } => {
                self.ended = true;
                self.metrics.extend(metrics);
            }
        }
    }

    fn finish(&mut self) -> (TestStatus, Option<String>) {
        let trace = (!self.traces.is_empty()).then(|| self.traces.join("\n"));
        match (self.status, self.ended) {
            (Some(status), _) => (status, trace),
            (None, true) => (TestStatus::Pass, None),
            (None, false) => (
                TestStatus::Error,
                Some("executor finished without reporting that the test ended".to_owned()),
            ),
        }
    }
}
