// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by tongs.

use crate::{device::DeviceId, pool::PoolName, test_case::TestCaseEvent};
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error, fmt, time::Duration};
use thiserror::Error;

/// An error that occurred while reading or validating the tongs config.
#[derive(Debug, Error)]
#[error("failed to read tongs config{}", display_config_file(.config_file.as_ref()))]
#[non_exhaustive]
pub struct ConfigReadError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigReadErrorKind,
}

impl ConfigReadError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigReadErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file that failed to be read, or `None` for the built-in defaults.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigReadErrorKind {
        &self.kind
    }
}

fn display_config_file(config_file: Option<&Utf8PathBuf>) -> String {
    match config_file {
        Some(file) => format!(" at `{file}`"),
        None => String::new(),
    }
}

/// The kind of error that occurred in [`ConfigReadError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigReadErrorKind {
    /// The config could not be parsed or deserialized.
    #[error(transparent)]
    Build(#[from] ConfigError),

    /// A value in the config was invalid.
    #[error("invalid value for `{key}`: {message}")]
    InvalidValue {
        /// The key that was invalid.
        key: &'static str,
        /// A description of the problem.
        message: String,
    },
}

/// An error returned by a [`DeviceProvider`](crate::device::DeviceProvider).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DeviceProviderError {
    /// The same serial was listed more than once.
    #[error("device serial `{serial}` is listed more than once")]
    DuplicateSerial {
        /// The duplicated serial.
        serial: String,
    },

    /// Devices could not be enumerated.
    #[error("failed to enumerate devices: {message}")]
    Unavailable {
        /// A description of the problem.
        message: String,
    },
}

/// An error that occurred while grouping devices into pools.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum PoolLoadError {
    /// The device provider failed.
    #[error("failed to load devices")]
    DeviceProvider(#[from] DeviceProviderError),

    /// No devices were found.
    #[error("no devices found")]
    NoDevicesFound,

    /// The pooling strategy produced no pools.
    #[error("no pools were configured")]
    NoPools,

    /// A pool ended up with no devices.
    #[error("pool `{pool}` has no devices")]
    EmptyPool {
        /// The name of the empty pool.
        pool: PoolName,
    },

    /// A manual pool referred to a serial that is not connected.
    #[error("pool `{pool}` refers to unknown device `{serial}` (known devices: {})",
        .known.iter().join(", "))]
    UnknownDevice {
        /// The pool that referred to the device.
        pool: PoolName,
        /// The unknown serial.
        serial: String,
        /// The serials that are known.
        known: Vec<DeviceId>,
    },

    /// The same device was provided more than once.
    #[error("device `{device}` was provided more than once")]
    DuplicateDevice {
        /// The duplicated device.
        device: DeviceId,
    },

    /// A device was assigned to more than one pool.
    #[error("device `{device}` is in both pool `{first}` and pool `{second}`")]
    DeviceInMultiplePools {
        /// The device.
        device: DeviceId,
        /// The first pool it was assigned to.
        first: PoolName,
        /// The second pool it was assigned to.
        second: PoolName,
    },
}

impl PoolLoadError {
    /// Returns true if this error is due to no devices being available at all.
    pub fn is_no_devices(&self) -> bool {
        matches!(self, Self::NoDevicesFound)
    }
}

/// An error that occurred while reading the list of test cases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestSuiteLoadError {
    /// The test list could not be read.
    #[error("failed to read test list at `{path}`")]
    Read {
        /// The path to the test list.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The test list could not be parsed.
    #[error("failed to parse test list at `{path}`")]
    Parse {
        /// The path to the test list.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

/// A test case that no device in a pool is allowed to run.
///
/// Returned by [`TestCaseEventQueue::offer`](crate::queue::TestCaseEventQueue::offer), handing the
/// event back to the caller so that it is never silently dropped.
#[derive(Clone, Debug, Error)]
#[error("test case {event} is excluded from every device in pool `{pool}`")]
pub struct UnservableEvent {
    /// The pool the event was offered to.
    pub pool: PoolName,
    /// The event that was rejected.
    pub event: TestCaseEvent,
}

/// An error that prevents a run from starting. No pool has started when this is returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunSetupError {
    /// No pools were provided.
    #[error("no pools to run tests on")]
    NoPools,

    /// The test suite is empty.
    #[error("no test cases found")]
    NoTestCases,

    /// A worker thread pool could not be built.
    #[error("failed to build thread pool for {name}")]
    ThreadPoolBuild {
        /// What the thread pool was for.
        name: String,
        /// The underlying error.
        #[source]
        err: rayon::ThreadPoolBuildError,
    },
}

/// A fatal, run-level failure while executing a test: the executor could not produce any
/// lifecycle events for the attempt.
///
/// These are converted into `ERROR` results and go through the retry gate like any other failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The test command could not be started.
    #[error("failed to start `{command}`")]
    Spawn {
        /// The command line.
        command: String,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Waiting for the test command failed.
    #[error("failed to wait for `{command}`")]
    Wait {
        /// The command line.
        command: String,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The test produced no result within its output timeout.
    #[error("test produced no result within {}", format_secs(*.timeout))]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The device disconnected or the executor otherwise failed.
    #[error("test run failed on device `{device}`: {message}")]
    Fatal {
        /// The device the test was running on.
        device: DeviceId,
        /// A description of the failure.
        message: String,
    },
}

/// An error that occurred while writing a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// A report directory or file could not be written.
    #[error("failed to write report to `{path}`")]
    Io {
        /// The path being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The JUnit report could not be serialized.
    #[error("failed to serialize JUnit report to `{path}`")]
    Junit {
        /// The path being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: quick_junit::SerializeError,
    },

    /// The JSON summary could not be serialized.
    #[error("failed to serialize JSON summary to `{path}`")]
    Json {
        /// The path being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

fn format_secs(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut cause = self.error.source();
        while let Some(err) = cause {
            write!(f, "\n  caused by: {err}")?;
            cause = err.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_error_chain() {
        let err = ExecutionError::Spawn {
            command: "adb -s emulator-5554 shell am instrument".to_owned(),
            err: std::io::Error::new(std::io::ErrorKind::NotFound, "adb not found"),
        };
        assert_eq!(
            DisplayErrorChain::new(&err).to_string(),
            "failed to start `adb -s emulator-5554 shell am instrument`\n  caused by: adb not found"
        );
    }

    #[test]
    fn timed_out_display() {
        let err = ExecutionError::TimedOut {
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "test produced no result within 1.500s");
    }
}
