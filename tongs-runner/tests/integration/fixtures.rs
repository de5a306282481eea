// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, Once},
    time::Duration,
};
use tongs_runner::{
    device::Device,
    errors::ExecutionError,
    executor::{ExecutionRequest, OutcomeSender, TestExecutor},
    pool::{Pool, PoolName},
    runner::RunnerSettings,
    test_case::{TestCaseEvent, TestIdentifier, TestSuite},
};

pub(crate) const CLASS: &str = "com.example.FixtureTest";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FixtureStatus {
    Pass,
    Fail,
    Flaky { pass_attempt: usize },
    /// Fails on this device and passes everywhere else.
    FailOn(&'static str),
    Hang,
    ExecFail,
    Ignored,
    AssumptionFailure,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RecordedAttempt {
    pub(crate) method: String,
    pub(crate) device: String,
    pub(crate) attempt: usize,
}

/// A [`TestExecutor`] whose behavior for each test method is scripted.
#[derive(Debug, Default)]
pub(crate) struct FixtureExecutor {
    statuses: HashMap<String, FixtureStatus>,
    attempts: Mutex<Vec<RecordedAttempt>>,
}

impl FixtureExecutor {
    pub(crate) fn new<'a>(statuses: impl IntoIterator<Item = (&'a str, FixtureStatus)>) -> Self {
        Self {
            statuses: statuses
                .into_iter()
                .map(|(method, status)| (method.to_owned(), status))
                .collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attempts(&self) -> Vec<RecordedAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn attempts_of(&self, method: &str) -> Vec<RecordedAttempt> {
        self.attempts()
            .into_iter()
            .filter(|attempt| attempt.method == method)
            .collect()
    }

    /// Builds a suite with one test case per scripted method, in the given order.
    pub(crate) fn suite(&self, methods: &[&str]) -> TestSuite {
        TestSuite::new(methods.iter().map(|method| {
            let id = TestIdentifier::new(CLASS, *method);
            match self.statuses.get(*method) {
                Some(FixtureStatus::Ignored) => {
                    TestCaseEvent::with_metadata(id, true, BTreeMap::new(), Vec::new(), [])
                }
                _ => TestCaseEvent::new(id),
            }
        }))
    }
}

impl TestExecutor for FixtureExecutor {
    fn execute(
        &self,
        request: &ExecutionRequest,
        outcomes: &OutcomeSender,
    ) -> Result<(), ExecutionError> {
        let method = request.test_case.id().method();
        self.attempts.lock().unwrap().push(RecordedAttempt {
            method: method.to_owned(),
            device: request.device.serial().to_owned(),
            attempt: request.attempt,
        });

        let status = self
            .statuses
            .get(method)
            .copied()
            .unwrap_or(FixtureStatus::Pass);
        outcomes.started();
        match status {
            FixtureStatus::Pass | FixtureStatus::Ignored => {}
            FixtureStatus::Fail => outcomes.failed(format!("{method} failed")),
            FixtureStatus::Flaky { pass_attempt } => {
                if request.attempt < pass_attempt {
                    outcomes.failed(format!("{method} failed on attempt {}", request.attempt));
                }
            }
            FixtureStatus::FailOn(serial) => {
                if request.device.serial() == serial {
                    outcomes.failed(format!("{method} failed on {serial}"));
                }
            }
            FixtureStatus::Hang => {
                std::thread::sleep(Duration::from_secs(5));
            }
            FixtureStatus::ExecFail => {
                return Err(ExecutionError::Fatal {
                    device: request.device.id().clone(),
                    message: "device disconnected".to_owned(),
                });
            }
            FixtureStatus::AssumptionFailure => {
                outcomes.assumption_failed(format!("{method} assumption failed"));
            }
        }
        outcomes.ended(BTreeMap::new());
        Ok(())
    }
}

pub(crate) fn pool(name: &str, serials: &[&str]) -> Pool {
    Pool::new(
        PoolName::new(name),
        serials.iter().map(|serial| Device::new(*serial, 30)).collect(),
    )
    .unwrap()
}

pub(crate) fn id(method: &str) -> TestIdentifier {
    TestIdentifier::new(CLASS, method)
}

/// Settings with short timeouts so that hanging fixtures are abandoned quickly.
pub(crate) fn fast_settings() -> RunnerSettings {
    let mut settings = RunnerSettings::default();
    settings
        .set_poll_timeout(Duration::from_millis(50))
        .set_test_output_timeout(Duration::from_millis(200))
        .set_listener_settle_timeout(Duration::from_millis(100));
    settings
}

pub(crate) fn executor_arc(executor: &Arc<FixtureExecutor>) -> Arc<dyn TestExecutor> {
    executor.clone()
}

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = color_eyre::install();
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}
