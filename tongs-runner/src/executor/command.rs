// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExecutionRequest, OutcomeSender, TestExecutor};
use crate::errors::ExecutionError;
use duct::cmd;
use std::{collections::BTreeMap, time::Instant};
use tracing::debug;

/// A [`TestExecutor`] that runs a templated command for each attempt.
///
/// The template is split into words like a shell would, then the placeholders `{serial}`,
/// `{class}`, `{method}` and `{attempt}` are substituted in each word. An exit code of 0 means the
/// test passed and any other exit code means it failed. If a line of standard output is exactly
/// [`Self::IGNORED_MARKER`] or [`Self::ASSUMPTION_FAILED_MARKER`], the test is reported as ignored
/// or as having failed an assumption instead.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    template: Vec<String>,
}

impl CommandExecutor {
    /// Marker line reporting that the test was ignored.
    pub const IGNORED_MARKER: &'static str = "TONGS_IGNORED";

    /// Marker line reporting that an assumption in the test did not hold.
    pub const ASSUMPTION_FAILED_MARKER: &'static str = "TONGS_ASSUMPTION_FAILED";

    /// Creates a new executor from a command template.
    pub fn new(template: &str) -> Result<Self, shell_words::ParseError> {
        let template = shell_words::split(template)?;
        Ok(Self { template })
    }

    fn render(&self, request: &ExecutionRequest) -> Vec<String> {
        let attempt = request.attempt.to_string();
        self.template
            .iter()
            .map(|word| {
                word.replace("{serial}", request.device.serial())
                    .replace("{class}", request.test_case.id().class())
                    .replace("{method}", request.test_case.id().method())
                    .replace("{attempt}", &attempt)
            })
            .collect()
    }
}

impl TestExecutor for CommandExecutor {
    fn execute(
        &self,
        request: &ExecutionRequest,
        outcomes: &OutcomeSender,
    ) -> Result<(), ExecutionError> {
        let args = self.render(request);
        let command = shell_words::join(&args);
        let Some((program, args)) = args.split_first() else {
            return Err(ExecutionError::Spawn {
                command,
                err: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        debug!("[{}] running `{command}`", request.device.serial());
        let start = Instant::now();
        let handle = cmd(program, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .env("TONGS_ATTEMPT", request.attempt.to_string())
            .start()
            .map_err(|err| ExecutionError::Spawn {
                command: command.clone(),
                err,
            })?;
        outcomes.started();

        // The deadline also bounds the wait for the output pipes, which a grandchild of the
        // command may keep open after the command itself is killed.
        let output = match handle.wait_deadline(start + request.output_timeout) {
            Ok(Some(output)) => output,
            Ok(None) => {
                let _ = handle.kill();
                return Err(ExecutionError::TimedOut {
                    timeout: request.output_timeout,
                });
            }
            Err(err) => {
                return Err(ExecutionError::Wait {
                    command: command.clone(),
                    err,
                });
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stdout.lines().any(|line| line.trim() == Self::IGNORED_MARKER) {
            outcomes.ignored();
        } else if stdout
            .lines()
            .any(|line| line.trim() == Self::ASSUMPTION_FAILED_MARKER)
        {
            outcomes.assumption_failed(format!("{stdout}{stderr}"));
        } else if !output.status.success() {
            let exit = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_owned(),
            };
            outcomes.failed(format!("`{command}` failed with {exit}\n{stdout}{stderr}"));
        }

        let mut metrics = BTreeMap::new();
        if let Some(code) = output.status.code() {
            metrics.insert("exit-code".to_owned(), code.to_string());
        }
        metrics.insert(
            "duration-ms".to_owned(),
            start.elapsed().as_millis().to_string(),
        );
        outcomes.ended(metrics);
        Ok(())
    }
}
