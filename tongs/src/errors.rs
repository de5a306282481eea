// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::NO_HEADING;
use owo_colors::{OwoColorize, Style};
use std::error::Error;
use thiserror::Error;
use tongs_metadata::TongsExitCode;
use tongs_runner::errors::{
    ConfigReadError, PoolLoadError, RunSetupError, TestSuiteLoadError, WriteReportError,
};
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are printed through display_to_stderr.

/// An error that tongs expects and reports with a specific exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config read error")]
    ConfigRead {
        #[from]
        err: ConfigReadError,
    },
    #[error("pool load error")]
    PoolLoad {
        #[from]
        err: PoolLoadError,
    },
    #[error("test suite load error")]
    TestSuiteLoad {
        #[from]
        err: TestSuiteLoadError,
    },
    #[error("no executor command")]
    NoExecutorCommand,
    #[error("executor command parse error")]
    ExecutorCommandParse {
        command: String,
        #[source]
        err: shell_words::ParseError,
    },
    #[error("run setup error")]
    RunSetup {
        #[from]
        err: RunSetupError,
    },
    #[error("write report error")]
    WriteReport {
        #[from]
        err: WriteReportError,
    },
    #[error("write output error")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    /// Returns the exit code for this error.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::PoolLoad { err } if err.is_no_devices() => TongsExitCode::NO_DEVICES,
            Self::ConfigRead { .. }
            | Self::PoolLoad { .. }
            | Self::TestSuiteLoad { .. }
            | Self::NoExecutorCommand
            | Self::ExecutorCommandParse { .. }
            | Self::RunSetup { .. } => TongsExitCode::SETUP_ERROR,
            Self::WriteReport { .. } | Self::WriteOutput { .. } => TongsExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => TongsExitCode::TEST_RUN_FAILED,
        }
    }

    /// Logs this error and its chain of causes.
    pub fn display_to_stderr(&self, emphasis: Style) {
        let mut next_error = match self {
            Self::ConfigRead { err } => {
                match err.config_file() {
                    Some(path) => error!(
                        "failed to read config at `{}`",
                        path.style(emphasis)
                    ),
                    None => error!("failed to read config"),
                }
                Some(err.kind() as &dyn Error)
            }
            Self::PoolLoad { err } => {
                error!("failed to set up device pools");
                Some(err as &dyn Error)
            }
            Self::TestSuiteLoad { err } => {
                error!("failed to load the test list");
                Some(err as &dyn Error)
            }
            Self::NoExecutorCommand => {
                error!(
                    "no executor command: pass {} or set `command` under [executor] in {}",
                    "--command".style(emphasis),
                    tongs_runner::config::TongsConfig::CONFIG_PATH.style(emphasis),
                );
                None
            }
            Self::ExecutorCommandParse { command, err } => {
                error!(
                    "failed to parse executor command `{}`",
                    command.style(emphasis)
                );
                Some(err as &dyn Error)
            }
            Self::RunSetup { err } => {
                error!("failed to start the run");
                Some(err as &dyn Error)
            }
            Self::WriteReport { err } => {
                error!("failed to write report");
                Some(err as &dyn Error)
            }
            Self::WriteOutput { err } => {
                error!("failed to write to stdout");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
